//! Construction of the initializer method.
//!
//! The body probes for a type named [`PROBE_TYPE_NAME`] in the executing assembly through
//! reflection, looks up its [`PROBE_METHOD_NAME`] method and invokes it. Nothing is resolved at
//! injection time; an assembly without the probe type simply runs an initializer that returns.

use crate::{
    assembly::{verify_body, InstructionEncoder, Operand},
    cilassembly::{MetadataGraph, MethodBody, MethodDefinition},
    initializer::{INITIALIZER_FLAGS, INITIALIZER_NAME, PROBE_METHOD_NAME, PROBE_TYPE_NAME},
    metadata::{
        method::MethodImplFlags,
        signatures::{
            SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, TypeSignature,
        },
        token::Token,
    },
    Error, Result,
};

/// Local slot of the probed `System.Type`
const LOCAL_TYPE: u16 = 0;
/// Local slot of the type null check
const LOCAL_HAS_TYPE: u16 = 1;
/// Local slot of the probed `System.Reflection.MethodInfo`
const LOCAL_METHOD: u16 = 2;
/// Local slot of the method null check
const LOCAL_HAS_METHOD: u16 = 3;

/// Label of the shared `ret`
const END_LABEL: &str = "END";

/// Framework members called by the initializer, resolved in the target module.
#[derive(Debug, Clone, Copy)]
struct Framework {
    type_type: Token,
    method_info_type: Token,
    get_executing_assembly: Token,
    get_type: Token,
    type_inequality: Token,
    get_method: Token,
    method_info_inequality: Token,
    invoke: Token,
}

impl Framework {
    fn resolve<G: MetadataGraph + ?Sized>(graph: &mut G) -> Result<Framework> {
        let assembly_type = graph.type_reference("System.Reflection", "Assembly")?;
        let type_type = graph.type_reference("System", "Type")?;
        let method_base_type = graph.type_reference("System.Reflection", "MethodBase")?;
        let method_info_type = graph.type_reference("System.Reflection", "MethodInfo")?;

        let assembly = TypeSignature::Class(assembly_type);
        let type_class = TypeSignature::Class(type_type);
        let method_info = TypeSignature::Class(method_info_type);

        let get_executing_assembly = graph.method_reference(
            assembly_type,
            "GetExecutingAssembly",
            &SignatureMethod::new(false, assembly, vec![]),
        )?;
        let get_type = graph.method_reference(
            assembly_type,
            "GetType",
            &SignatureMethod::new(true, type_class.clone(), vec![TypeSignature::String]),
        )?;
        let type_inequality = graph.method_reference(
            type_type,
            "op_Inequality",
            &SignatureMethod::new(
                false,
                TypeSignature::Boolean,
                vec![type_class.clone(), type_class],
            ),
        )?;
        let get_method = graph.method_reference(
            type_type,
            "GetMethod",
            &SignatureMethod::new(true, method_info.clone(), vec![TypeSignature::String]),
        )?;
        let method_info_inequality = graph.method_reference(
            method_info_type,
            "op_Inequality",
            &SignatureMethod::new(
                false,
                TypeSignature::Boolean,
                vec![method_info.clone(), method_info],
            ),
        )?;
        let invoke = graph.method_reference(
            method_base_type,
            "Invoke",
            &SignatureMethod::new(
                true,
                TypeSignature::Object,
                vec![
                    TypeSignature::Object,
                    TypeSignature::SzArray(Box::new(TypeSignature::Object)),
                ],
            ),
        )?;

        Ok(Framework {
            type_type,
            method_info_type,
            get_executing_assembly,
            get_type,
            type_inequality,
            get_method,
            method_info_inequality,
            invoke,
        })
    }
}

/// Build the initializer method for the module behind `graph`.
///
/// Framework references missing from the module are appended to it; the method itself is not
/// added. With `verify` set the body is replayed before it is returned.
///
/// # Errors
/// Returns [`Error::MissingCoreLibrary`] if framework types cannot be referenced, and
/// [`Error::InvalidBody`] if verification fails.
pub fn build_initializer<G: MetadataGraph + ?Sized>(
    graph: &mut G,
    verify: bool,
) -> Result<MethodDefinition> {
    let framework = Framework::resolve(graph)?;
    let type_name = graph.user_string(PROBE_TYPE_NAME)?;
    let method_name = graph.user_string(PROBE_METHOD_NAME)?;

    let mut encoder = InstructionEncoder::new();
    let call = |encoder: &mut InstructionEncoder, mnemonic: &str, method: Token| {
        let effect = graph.call_effect(method)?;
        encoder.emit_call(mnemonic, method, effect)
    };

    encoder.emit_instruction("nop", None)?;
    call(&mut encoder, "call", framework.get_executing_assembly)?;
    encoder.emit_instruction("ldstr", Some(Operand::Token(type_name)))?;
    call(&mut encoder, "callvirt", framework.get_type)?;
    encoder.emit_stloc(LOCAL_TYPE)?;
    encoder.emit_ldloc(LOCAL_TYPE)?;
    encoder.emit_instruction("ldnull", None)?;
    call(&mut encoder, "call", framework.type_inequality)?;
    encoder.emit_stloc(LOCAL_HAS_TYPE)?;
    encoder.emit_ldloc(LOCAL_HAS_TYPE)?;
    encoder.emit_branch("brfalse.s", END_LABEL)?;

    encoder.emit_ldloc(LOCAL_TYPE)?;
    encoder.emit_instruction("ldstr", Some(Operand::Token(method_name)))?;
    call(&mut encoder, "callvirt", framework.get_method)?;
    encoder.emit_stloc(LOCAL_METHOD)?;
    encoder.emit_ldloc(LOCAL_METHOD)?;
    encoder.emit_instruction("ldnull", None)?;
    call(&mut encoder, "call", framework.method_info_inequality)?;
    encoder.emit_stloc(LOCAL_HAS_METHOD)?;
    encoder.emit_ldloc(LOCAL_HAS_METHOD)?;
    encoder.emit_branch("brfalse.s", END_LABEL)?;

    encoder.emit_ldloc(LOCAL_METHOD)?;
    encoder.emit_instruction("ldnull", None)?;
    encoder.emit_instruction("ldnull", None)?;
    call(&mut encoder, "callvirt", framework.invoke)?;
    encoder.emit_instruction("pop", None)?;

    encoder.define_label(END_LABEL)?;
    encoder.emit_instruction("ret", None)?;

    let (code, max_stack, _) = encoder.finalize()?;

    if verify {
        let replayed = verify_body(&code, &[], false, |token| graph.call_effect(token))?;
        if replayed != max_stack {
            return Err(Error::InvalidBody(format!(
                "replayed stack depth {replayed} differs from the emitted {max_stack}"
            )));
        }
    }

    let locals = SignatureLocalVariables {
        locals: vec![
            SignatureLocalVariable::new(TypeSignature::Class(framework.type_type)),
            SignatureLocalVariable::new(TypeSignature::Boolean),
            SignatureLocalVariable::new(TypeSignature::Class(framework.method_info_type)),
            SignatureLocalVariable::new(TypeSignature::Boolean),
        ],
    };

    Ok(MethodDefinition {
        name: INITIALIZER_NAME.to_string(),
        flags: INITIALIZER_FLAGS,
        impl_flags: MethodImplFlags::IL.bits(),
        signature: SignatureMethod::new(false, TypeSignature::Void, vec![]),
        body: MethodBody {
            code,
            max_stack,
            locals,
            init_locals: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{decode_stream, Instruction},
        file::parser::Parser,
        metadata::tables::TableId,
        test::mock::MockGraph,
    };

    fn decode(code: &[u8]) -> Vec<Instruction> {
        decode_stream(&mut Parser::new(code)).unwrap()
    }

    #[test]
    fn instruction_sequence() {
        let mut graph = MockGraph::new();
        let method = build_initializer(&mut graph, true).unwrap();

        let mnemonics: Vec<&str> = decode(&method.body.code)
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect();
        assert_eq!(
            mnemonics,
            [
                "nop", "call", "ldstr", "callvirt", "stloc.0", "ldloc.0", "ldnull", "call",
                "stloc.1", "ldloc.1", "brfalse.s", "ldloc.0", "ldstr", "callvirt", "stloc.2",
                "ldloc.2", "ldnull", "call", "stloc.3", "ldloc.3", "brfalse.s", "ldloc.2",
                "ldnull", "ldnull", "callvirt", "pop", "ret",
            ]
        );
        assert_eq!(method.body.max_stack, 3);
        assert_eq!(method.body.code.len(), 61);
    }

    #[test]
    fn branches_reach_the_single_ret() {
        let mut graph = MockGraph::new();
        let method = build_initializer(&mut graph, false).unwrap();
        let instructions = decode(&method.body.code);

        let ret = instructions.last().unwrap();
        assert_eq!(ret.mnemonic, "ret");
        assert_eq!(ret.offset, 60);

        let branches: Vec<&Instruction> = instructions
            .iter()
            .filter(|instruction| instruction.mnemonic == "brfalse.s")
            .collect();
        assert_eq!(branches.len(), 2);
        for branch in branches {
            assert_eq!(branch.branch_targets, vec![ret.offset]);
        }
        assert_eq!(
            instructions
                .iter()
                .filter(|instruction| instruction.mnemonic == "ret")
                .count(),
            1
        );
    }

    #[test]
    fn stack_balance_replay() {
        let mut graph = MockGraph::new();
        let method = build_initializer(&mut graph, false).unwrap();
        let depth = verify_body(&method.body.code, &[], false, |token| graph.call_effect(token))
            .unwrap();
        assert_eq!(depth, method.body.max_stack);
    }

    #[test]
    fn definition_shape() {
        let mut graph = MockGraph::new();
        let method = build_initializer(&mut graph, true).unwrap();

        assert_eq!(method.name, ".cctor");
        assert_eq!(method.flags, 0x1891);
        assert_eq!(method.impl_flags, 0);
        assert!(!method.signature.has_this);
        assert!(method.signature.params.is_empty());
        assert_eq!(method.signature.return_type.base, TypeSignature::Void);
        assert!(method.body.init_locals);

        let locals: Vec<&TypeSignature> =
            method.body.locals.locals.iter().map(|local| &local.base).collect();
        let type_ref = graph.type_ref("System", "Type").unwrap();
        let method_info = graph.type_ref("System.Reflection", "MethodInfo").unwrap();
        assert_eq!(
            locals,
            [
                &TypeSignature::Class(type_ref),
                &TypeSignature::Boolean,
                &TypeSignature::Class(method_info),
                &TypeSignature::Boolean,
            ]
        );
    }

    #[test]
    fn probe_strings_and_references() {
        let mut graph = MockGraph::new();
        let method = build_initializer(&mut graph, true).unwrap();

        assert_eq!(graph.user_strings, ["ModuleInitializer", "Run"]);
        let strings: Vec<Token> = decode(&method.body.code)
            .iter()
            .filter(|instruction| instruction.mnemonic == "ldstr")
            .filter_map(Instruction::get_token_operand)
            .collect();
        assert_eq!(strings.len(), 2);
        assert_eq!(graph.user_string_value(strings[0]), Some("ModuleInitializer"));
        assert_eq!(graph.user_string_value(strings[1]), Some("Run"));

        let invoke = graph.member_ref("Invoke").unwrap();
        assert_eq!(invoke.0, graph.type_ref("System.Reflection", "MethodBase").unwrap());
        assert_eq!(invoke.1.call_effect().params, 3);
        for call in decode(&method.body.code)
            .iter()
            .filter(|instruction| instruction.mnemonic.starts_with("call"))
        {
            let token = call.get_token_operand().unwrap();
            assert_eq!(token.table_id(), Some(TableId::MemberRef));
        }
    }

    #[test]
    fn missing_core_library() {
        let mut graph = MockGraph::new().without_core_library();
        assert!(matches!(
            build_initializer(&mut graph, true),
            Err(Error::MissingCoreLibrary)
        ));
    }
}
