//! The closed function registry.

use crate::check::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Label,
    Annotation,
    Priority,
    Size,
    StartsWith,
    EndsWith,
    Contains,
    Matches,
}

pub struct Signature {
    /// Accepted receiver types; empty for global functions.
    pub receiver: Vec<Type>,
    /// Accepted types per positional parameter.
    pub params: Vec<Vec<Type>>,
    pub ret: Type,
}

impl Function {
    pub fn global(name: &str) -> Option<Self> {
        Some(match name {
            "label" => Function::Label,
            "annotation" => Function::Annotation,
            "priority" => Function::Priority,
            _ => return None,
        })
    }

    pub fn method(name: &str) -> Option<Self> {
        Some(match name {
            "size" => Function::Size,
            "startsWith" => Function::StartsWith,
            "endsWith" => Function::EndsWith,
            "contains" => Function::Contains,
            "matches" => Function::Matches,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Label => "label",
            Function::Annotation => "annotation",
            Function::Priority => "priority",
            Function::Size => "size",
            Function::StartsWith => "startsWith",
            Function::EndsWith => "endsWith",
            Function::Contains => "contains",
            Function::Matches => "matches",
        }
    }

    pub fn signature(self) -> Signature {
        let string = || vec![Type::String];
        let sized = || vec![Type::String, Type::List(Box::new(Type::Dyn)), Type::Map];
        match self {
            Function::Label | Function::Annotation => {
                Signature { receiver: vec![], params: vec![string(), string()], ret: Type::Mutation }
            }
            Function::Priority => Signature { receiver: vec![], params: vec![string()], ret: Type::Mutation },
            // the parser rewrites `size(x)` into `x.size()`
            Function::Size => Signature { receiver: sized(), params: vec![], ret: Type::Int },
            Function::StartsWith | Function::EndsWith | Function::Contains | Function::Matches => {
                Signature { receiver: string(), params: vec![string()], ret: Type::Bool }
            }
        }
    }
}
