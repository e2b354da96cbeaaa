//! Synthesis of the module initializer.
//!
//! Injection runs against any [`MetadataGraph`]:
//!
//! 1. Find `<Module>` and check its methods for an existing initializer ([`check_collision`])
//! 2. Resolve the reflection members the body calls and emit the body ([`build_initializer`])
//! 3. Append the method to `<Module>`
//!
//! The first step fails before the graph is touched. The emitted body is equivalent to
//!
//! ```text
//! Type type = Assembly.GetExecutingAssembly().GetType("ModuleInitializer");
//! if (type != null) {
//!     MethodInfo run = type.GetMethod("Run");
//!     if (run != null) run.Invoke(null, null);
//! }
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use modinit::{initializer, CilAssembly};
//! use std::path::Path;
//!
//! let mut assembly = CilAssembly::load(Path::new("app.dll"), None)?;
//! let token = initializer::inject(&mut assembly, true)?;
//! assert_eq!(token.table(), 0x06);
//! # Ok::<(), modinit::Error>(())
//! ```

mod collision;
mod emit;

pub use collision::check_collision;
pub use emit::build_initializer;

use crate::{cilassembly::MetadataGraph, metadata::token::Token, Result};

/// Name of the injected method
pub const INITIALIZER_NAME: &str = ".cctor";

/// `Private | Static | HideBySig | SpecialName | RTSpecialName`
pub const INITIALIZER_FLAGS: u16 = 0x1891;

/// Type looked up in the executing assembly at run time
pub const PROBE_TYPE_NAME: &str = "ModuleInitializer";

/// Method invoked on the probe type
pub const PROBE_METHOD_NAME: &str = "Run";

/// Add an initializer to the module type of `graph` and return its `MethodDef` token.
///
/// # Errors
/// Returns [`crate::Error::ModuleTypeNotFound`] without `<Module>`,
/// [`crate::Error::DuplicateInitializer`] if one is already present, and emission or storage
/// errors from [`build_initializer`] and [`MetadataGraph::add_method`].
pub fn inject<G: MetadataGraph + ?Sized>(graph: &mut G, verify: bool) -> Result<Token> {
    let module = graph.module_type()?;
    check_collision(&graph.methods(module)?)?;

    let method = build_initializer(graph, verify)?;
    let size = method.body.code.len();
    let token = graph.add_method(module, method)?;

    log::info!("Injected {} {} ({} bytes of IL)", INITIALIZER_NAME, token, size);
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{method::MethodModifiers, tables::TableId},
        test::mock::MockGraph,
        Error, ErrorKind,
    };

    #[test]
    fn flags_spell_out() {
        let modifiers = MethodModifiers::STATIC
            | MethodModifiers::HIDE_BY_SIG
            | MethodModifiers::SPECIAL_NAME
            | MethodModifiers::RTSPECIAL_NAME;
        assert_eq!(INITIALIZER_FLAGS, modifiers.bits() | 0x0001);
    }

    #[test]
    fn injects_into_module_type() {
        let mut graph = MockGraph::new().with_method(1, "Helper", 0x0091);
        let token = inject(&mut graph, true).unwrap();

        assert_eq!(token.table_id(), Some(TableId::MethodDef));
        let (owner, method) = graph.added.last().unwrap();
        assert_eq!(*owner, graph.module_type().unwrap());
        assert_eq!(method.name, ".cctor");
        assert_eq!(method.flags, 0x1891);

        let names: Vec<String> = graph
            .methods(graph.module_type().unwrap())
            .unwrap()
            .into_iter()
            .map(|method| method.name)
            .collect();
        assert_eq!(names, ["Helper", ".cctor"]);
    }

    #[test]
    fn second_injection_is_a_duplicate() {
        let mut graph = MockGraph::new();
        inject(&mut graph, true).unwrap();
        let references = graph.member_refs.len();

        let error = inject(&mut graph, true).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateInitializer);
        assert_eq!(graph.added.len(), 1);
        assert_eq!(graph.member_refs.len(), references);
    }

    #[test]
    fn duplicate_fails_before_mutation() {
        let mut graph = MockGraph::new().with_method(1, ".cctor", 0x1891);
        assert!(matches!(
            inject(&mut graph, true),
            Err(Error::DuplicateInitializer { .. })
        ));
        assert!(graph.added.is_empty());
        assert!(graph.type_refs.is_empty());
        assert!(graph.user_strings.is_empty());
    }

    #[test]
    fn narrower_cctor_is_kept() {
        let mut graph = MockGraph::new().with_method(1, ".cctor", 0x0011);
        inject(&mut graph, true).unwrap();
        let methods = graph.methods(graph.module_type().unwrap()).unwrap();
        assert_eq!(methods.len(), 2);
    }

    #[test]
    fn other_types_are_ignored() {
        // a conflicting .cctor on another type is not a collision
        let mut graph = MockGraph::new().with_method(2, ".cctor", 0x1891);
        assert!(inject(&mut graph, true).is_ok());
    }

    #[test]
    fn missing_module_type() {
        let mut graph = MockGraph::new().without_module_type();
        let error = inject(&mut graph, true).unwrap_err();
        assert!(matches!(error, Error::ModuleTypeNotFound));
        assert_eq!(error.kind(), ErrorKind::Structural);
    }
}
