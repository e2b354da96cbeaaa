//! Stack and branch verification of a method body.
//!
//! [`verify_body`] decodes a body and replays it along every reachable path. It checks that every
//! branch target and every exception clause boundary is an instruction boundary, that the stack
//! never underflows, that all paths into an instruction agree on the depth, and that `ret` leaves
//! nothing behind except the return value. The effect of calls depends on the target signature,
//! which the caller supplies through a resolver.

use std::collections::HashMap;

use crate::{
    assembly::{call_stack_effect, decode_stream, FlowType, Instruction},
    file::parser::Parser,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        signatures::CallEffect,
        token::Token,
    },
    Error, Result,
};

/// Replay `code` and return its maximum stack depth.
///
/// `returns_value` is false for `void` methods. `call_effect` resolves the token operand of
/// `call`, `callvirt`, `calli` and `newobj` to the effect of the target signature.
///
/// # Errors
/// Returns [`Error::InvalidBranch`] for a target that is not an instruction boundary,
/// [`Error::InvalidBody`] for stack underflow, depth disagreement, an unbalanced `ret` or code
/// that runs off the end, and decoder errors for invalid instructions.
pub fn verify_body<F>(
    code: &[u8],
    exception_handlers: &[ExceptionHandler],
    returns_value: bool,
    mut call_effect: F,
) -> Result<u16>
where
    F: FnMut(Token) -> Result<CallEffect>,
{
    let instructions = decode_stream(&mut Parser::new(code))?;
    if instructions.is_empty() {
        return Err(Error::InvalidBody("method body has no instructions".to_string()));
    }

    let boundaries: HashMap<u64, usize> = instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| (instruction.offset, index))
        .collect();
    let boundary = |offset: u64| {
        boundaries.get(&offset).copied().ok_or_else(|| {
            Error::InvalidBranch(format!("IL_{offset:04x} is not an instruction boundary"))
        })
    };

    for instruction in &instructions {
        for &target in &instruction.branch_targets {
            boundary(target)?;
        }
    }

    let mut worklist: Vec<(usize, u16)> = vec![(0, 0)];
    for clause in exception_handlers {
        boundary(u64::from(clause.try_offset))?;
        let try_end = u64::from(clause.try_offset) + u64::from(clause.try_length);
        if try_end != code.len() as u64 {
            boundary(try_end)?;
        }

        // catch and filter handlers start with the exception object on the stack
        let handler_depth = match clause.flags {
            ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT => 0,
            _ => 1,
        };
        worklist.push((boundary(u64::from(clause.handler_offset))?, handler_depth));
        if clause.flags == ExceptionHandlerFlags::FILTER {
            worklist.push((boundary(u64::from(clause.class_token_or_filter))?, 1));
        }
    }

    let mut depths: Vec<Option<u16>> = vec![None; instructions.len()];
    let mut max_stack = 0_u16;
    while let Some((index, depth)) = worklist.pop() {
        let instruction = &instructions[index];
        max_stack = max_stack.max(depth);
        match depths[index] {
            Some(known) if known == depth => continue,
            Some(known) => {
                return Err(Error::InvalidBody(format!(
                    "stack depth mismatch at IL_{:04x}: {} and {}",
                    instruction.offset, known, depth
                )))
            }
            None => depths[index] = Some(depth),
        }

        let (pops, pushes) = stack_effect(instruction, returns_value, &mut call_effect)?;
        let remaining = depth.checked_sub(u16::from(pops)).ok_or_else(|| {
            Error::InvalidBody(format!(
                "stack underflow at {:?}: depth {}, pops {}",
                instruction, depth, pops
            ))
        })?;

        if instruction.flow_type == FlowType::Return && remaining != 0 {
            return Err(Error::InvalidBody(format!(
                "{:?} leaves {} item(s) on the stack",
                instruction, remaining
            )));
        }

        let mut next_depth = remaining + u16::from(pushes);
        max_stack = max_stack.max(next_depth);
        if instruction.flow_type == FlowType::Leave {
            next_depth = 0;
        }

        for &target in &instruction.branch_targets {
            worklist.push((boundary(target)?, next_depth));
        }

        if !instruction.is_terminal() {
            if index + 1 == instructions.len() {
                return Err(Error::InvalidBody(format!(
                    "execution falls off the end of the body after {:?}",
                    instruction
                )));
            }
            worklist.push((index + 1, next_depth));
        }
    }

    Ok(max_stack)
}

fn stack_effect<F>(
    instruction: &Instruction,
    returns_value: bool,
    call_effect: &mut F,
) -> Result<(u8, u8)>
where
    F: FnMut(Token) -> Result<CallEffect>,
{
    match (instruction.flow_type, instruction.mnemonic) {
        (FlowType::Return, "ret") => Ok((u8::from(returns_value), 0)),
        (FlowType::Call, mnemonic) => {
            let token = instruction.get_token_operand().ok_or_else(|| {
                Error::InvalidBody(format!("{instruction:?} has no token operand"))
            })?;
            let (pops, pushes) = call_stack_effect(mnemonic, call_effect(token)?)?;
            if mnemonic == "calli" {
                // function pointer
                Ok((pops.saturating_add(1), pushes))
            } else {
                Ok((pops, pushes))
            }
        }
        _ => Ok((
            instruction.stack_behavior.pops,
            instruction.stack_behavior.pushes,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_calls(token: Token) -> Result<CallEffect> {
        Err(malformed_error!("unexpected call to {}", token))
    }

    fn handler(flags: ExceptionHandlerFlags, try_length: u32, handler_offset: u32) -> ExceptionHandler {
        ExceptionHandler {
            flags,
            try_offset: 0,
            try_length,
            handler_offset,
            handler_length: 1,
            class_token_or_filter: 0,
        }
    }

    #[test]
    fn balanced_branches() {
        // ldc.i4.1, brfalse.s +1, ldc.i4.2, pop, ret: the taken branch pops an empty stack
        let code = [0x17, 0x2C, 0x01, 0x18, 0x26, 0x2A];
        assert!(verify_body(&code, &[], false, no_calls).is_err());

        // ldc.i4.1, brfalse.s +2, ldc.i4.2, pop, nop, ret
        let code = [0x17, 0x2C, 0x02, 0x18, 0x26, 0x00, 0x2A];
        assert_eq!(verify_body(&code, &[], false, no_calls).unwrap(), 1);
    }

    #[test]
    fn ret_depth() {
        assert!(matches!(
            verify_body(&[0x17, 0x2A], &[], false, no_calls),
            Err(Error::InvalidBody(_))
        ));
        assert_eq!(verify_body(&[0x17, 0x2A], &[], true, no_calls).unwrap(), 1);
        assert!(verify_body(&[0x2A], &[], true, no_calls).is_err());
    }

    #[test]
    fn underflow() {
        assert!(matches!(
            verify_body(&[0x26, 0x2A], &[], false, no_calls),
            Err(Error::InvalidBody(_))
        ));
    }

    #[test]
    fn target_inside_instruction() {
        // br.s +1 lands inside ldc.i4.s 5
        let code = [0x2B, 0x01, 0x1F, 0x05, 0x26, 0x2A];
        assert!(matches!(
            verify_body(&code, &[], false, no_calls),
            Err(Error::InvalidBranch(_))
        ));
    }

    #[test]
    fn merge_mismatch() {
        // ldc.i4.0, ldc.i4.1, brtrue.s +1, pop, ret
        let code = [0x16, 0x17, 0x2D, 0x01, 0x26, 0x2A];
        assert!(matches!(
            verify_body(&code, &[], false, no_calls),
            Err(Error::InvalidBody(_))
        ));
    }

    #[test]
    fn falls_off_end() {
        assert!(verify_body(&[0x00], &[], false, no_calls).is_err());
        assert!(verify_body(&[], &[], false, no_calls).is_err());
    }

    #[test]
    fn calls() {
        // call 0A000001 (returns), callvirt 0A000002 (this, no result), ret
        #[rustfmt::skip]
        let code = [
            0x28, 0x01, 0x00, 0x00, 0x0A,
            0x6F, 0x02, 0x00, 0x00, 0x0A,
            0x2A,
        ];
        let max_stack = verify_body(&code, &[], false, |token| {
            Ok(match token.row() {
                1 => CallEffect {
                    has_this: false,
                    params: 0,
                    returns_value: true,
                },
                _ => CallEffect {
                    has_this: true,
                    params: 1,
                    returns_value: false,
                },
            })
        })
        .unwrap();
        assert_eq!(max_stack, 1);
    }

    #[test]
    fn exception_clauses() {
        // try { nop; leave.s END } finally { endfinally } END: ret
        let code = [0x00, 0xDE, 0x01, 0xDC, 0x2A];
        let clause = handler(ExceptionHandlerFlags::FINALLY, 3, 3);
        assert_eq!(verify_body(&code, &[clause], false, no_calls).unwrap(), 0);

        // try { nop; leave.s END } catch { pop; leave.s END } END: ret
        let code = [0x00, 0xDE, 0x03, 0x26, 0xDE, 0x00, 0x2A];
        let clause = handler(ExceptionHandlerFlags::EXCEPTION, 3, 3);
        assert_eq!(verify_body(&code, &[clause], false, no_calls).unwrap(), 1);

        let clause = handler(ExceptionHandlerFlags::EXCEPTION, 2, 3);
        assert!(matches!(
            verify_body(&code, &[clause], false, no_calls),
            Err(Error::InvalidBranch(_))
        ));
    }
}
