//! Exception handling clauses of a method body.

use bitflags::bitflags;

bitflags! {
    /// Kind of an exception handling clause
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// Typed catch clause
        const EXCEPTION = 0x0000;
        /// Filter clause
        const FILTER = 0x0001;
        /// Finally clause
        const FINALLY = 0x0002;
        /// Fault clause
        const FAULT = 0x0004;
    }
}

/// One exception handling clause (II.25.4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// Offset of the try block
    pub try_offset: u32,
    /// Length of the try block
    pub try_length: u32,
    /// Offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token for typed clauses, filter offset for filter clauses
    pub class_token_or_filter: u32,
}

impl ExceptionHandler {
    /// True if the clause carries a catch type token.
    #[must_use]
    pub fn has_class_token(&self) -> bool {
        self.flags == ExceptionHandlerFlags::EXCEPTION
    }
}
