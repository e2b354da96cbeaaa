//! In-memory [`MetadataGraph`] over plain vectors.

use crate::{
    cilassembly::{MetadataGraph, MethodDefinition, MethodSummary},
    metadata::{
        signatures::{CallEffect, SignatureMethod},
        tables::TableId,
        token::Token,
    },
    Error, Result,
};

/// Types are `TypeDef` rows in declaration order; rid 1 is `<Module>` unless removed.
#[derive(Debug, Default)]
pub struct MockGraph {
    pub types: Vec<(String, String)>,
    pub methods: Vec<(u32, MethodSummary, Option<SignatureMethod>)>,
    pub type_refs: Vec<(String, String)>,
    pub member_refs: Vec<(Token, String, SignatureMethod)>,
    pub user_strings: Vec<String>,
    pub added: Vec<(Token, MethodDefinition)>,
    pub core_library: bool,
}

impl MockGraph {
    pub fn new() -> Self {
        MockGraph {
            types: vec![
                (String::new(), "<Module>".to_string()),
                ("App".to_string(), "Program".to_string()),
            ],
            core_library: true,
            ..MockGraph::default()
        }
    }

    pub fn with_method(mut self, owner: u32, name: &str, flags: u16) -> Self {
        let token = Token::from_parts(TableId::MethodDef, self.methods.len() as u32 + 1);
        self.methods.push((
            owner,
            MethodSummary {
                token,
                name: name.to_string(),
                flags,
            },
            None,
        ));
        self
    }

    pub fn without_module_type(mut self) -> Self {
        self.types[0].1 = "Module".to_string();
        self
    }

    pub fn without_core_library(mut self) -> Self {
        self.core_library = false;
        self
    }

    pub fn type_ref(&self, namespace: &str, name: &str) -> Option<Token> {
        self.type_refs
            .iter()
            .position(|(ns, n)| ns == namespace && n == name)
            .map(|index| Token::from_parts(TableId::TypeRef, index as u32 + 1))
    }

    pub fn member_ref(&self, name: &str) -> Option<(Token, SignatureMethod)> {
        self.member_refs
            .iter()
            .find(|(_, n, _)| n == name)
            .map(|(parent, _, signature)| (*parent, signature.clone()))
    }

    pub fn user_string_value(&self, token: Token) -> Option<&str> {
        if token.table() != 0x70 || token.row() == 0 {
            return None;
        }
        self.user_strings
            .get(token.row() as usize - 1)
            .map(String::as_str)
    }
}

impl MetadataGraph for MockGraph {
    fn module_type(&self) -> Result<Token> {
        self.types
            .iter()
            .position(|(namespace, name)| namespace.is_empty() && name == "<Module>")
            .map(|index| Token::from_parts(TableId::TypeDef, index as u32 + 1))
            .ok_or(Error::ModuleTypeNotFound)
    }

    fn methods(&self, owner: Token) -> Result<Vec<MethodSummary>> {
        Ok(self
            .methods
            .iter()
            .filter(|(type_rid, _, _)| *type_rid == owner.row())
            .map(|(_, summary, _)| summary.clone())
            .collect())
    }

    fn type_reference(&mut self, namespace: &str, name: &str) -> Result<Token> {
        if !self.core_library {
            return Err(Error::MissingCoreLibrary);
        }
        if let Some(token) = self.type_ref(namespace, name) {
            return Ok(token);
        }
        self.type_refs
            .push((namespace.to_string(), name.to_string()));
        Ok(Token::from_parts(
            TableId::TypeRef,
            self.type_refs.len() as u32,
        ))
    }

    fn method_reference(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token> {
        if let Some(index) = self
            .member_refs
            .iter()
            .position(|(p, n, s)| *p == parent && n == name && s == signature)
        {
            return Ok(Token::from_parts(TableId::MemberRef, index as u32 + 1));
        }
        self.member_refs
            .push((parent, name.to_string(), signature.clone()));
        Ok(Token::from_parts(
            TableId::MemberRef,
            self.member_refs.len() as u32,
        ))
    }

    fn user_string(&mut self, value: &str) -> Result<Token> {
        self.user_strings.push(value.to_string());
        Ok(Token::user_string(self.user_strings.len() as u32))
    }

    fn call_effect(&self, method: Token) -> Result<CallEffect> {
        let row = method.row() as usize;
        let signature = match method.table_id() {
            Some(TableId::MemberRef) => self.member_refs.get(row - 1).map(|(_, _, s)| s),
            Some(TableId::MethodDef) => self
                .methods
                .get(row - 1)
                .and_then(|(_, _, signature)| signature.as_ref()),
            _ => None,
        };
        signature
            .map(SignatureMethod::call_effect)
            .ok_or_else(|| malformed_error!("unknown method {}", method))
    }

    fn add_method(&mut self, owner: Token, method: MethodDefinition) -> Result<Token> {
        let token = Token::from_parts(TableId::MethodDef, self.methods.len() as u32 + 1);
        self.methods.push((
            owner.row(),
            MethodSummary {
                token,
                name: method.name.clone(),
                flags: method.flags,
            },
            Some(method.signature.clone()),
        ));
        self.added.push((owner, method));
        Ok(token)
    }
}
