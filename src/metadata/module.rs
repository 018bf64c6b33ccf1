//! The module: an identity-bearing container of type definitions.
//!
//! A [`Module`] owns every type, member, body and attribute reachable from it. Definitions
//! enter a module through [`Module::add_type`], [`Module::add_method`] or by being pushed
//! directly followed by [`Module::assign_tokens`]; in every case the module, not the caller,
//! assigns the tokens that identify them.
//!
//! Types are looked up by full name. Nested types are addressed as `Namespace.Outer/Inner`.

use uguid::Guid;

use crate::{
    metadata::{
        method::MethodDef,
        signatures::split_full_name,
        token::{self, Token, TokenAllocator},
        typedef::{FieldDef, TypeDef},
    },
    Error, Result,
};

/// A compiled module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name, used by other modules to scope references to it
    pub name: String,
    /// Module version id
    pub mvid: Guid,
    /// Top-level types
    pub types: Vec<TypeDef>,
    tokens: TokenAllocator,
}

impl Module {
    /// An empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            mvid: Guid::ZERO,
            types: Vec::new(),
            tokens: TokenAllocator::default(),
        }
    }

    /// Find a type by full name, case-sensitively.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        let mut segments = full_name.split('/');
        let outer = segments.next()?;
        let mut current = self.types.iter().find(|t| t.full_name() == outer)?;
        for nested in segments {
            current = current.find_nested(nested)?;
        }
        Some(current)
    }

    /// Find a type by full name, mutably.
    pub fn find_type_mut(&mut self, full_name: &str) -> Option<&mut TypeDef> {
        let mut segments = full_name.split('/');
        let outer = segments.next()?;
        let mut current = self.types.iter_mut().find(|t| t.full_name() == outer)?;
        for nested in segments {
            current = current.find_nested_mut(nested)?;
        }
        Some(current)
    }

    /// Whether a type with this full name exists.
    #[must_use]
    pub fn contains_type(&self, full_name: &str) -> bool {
        self.find_type(full_name).is_some()
    }

    /// Every type with its full name, outer types before their nested types.
    #[must_use]
    pub fn walk_types(&self) -> Vec<(String, &TypeDef)> {
        fn collect<'a>(name: String, ty: &'a TypeDef, out: &mut Vec<(String, &'a TypeDef)>) {
            let nested: Vec<_> = ty
                .nested_types
                .iter()
                .map(|n| (format!("{name}/{}", n.name), n))
                .collect();
            out.push((name, ty));
            for (nested_name, nested_ty) in nested {
                collect(nested_name, nested_ty, out);
            }
        }

        let mut out = Vec::new();
        for ty in &self.types {
            collect(ty.full_name(), ty, &mut out);
        }
        out
    }

    /// Find the method carrying `token`, with the full name of its declaring type.
    #[must_use]
    pub fn method_by_token(&self, token: Token) -> Option<(String, &MethodDef)> {
        self.walk_types().into_iter().find_map(|(name, ty)| {
            ty.methods
                .iter()
                .find(|m| m.token == token)
                .map(|m| (name.clone(), m))
        })
    }

    /// Insert a type and assign tokens to it and everything it owns.
    ///
    /// A full name containing `/` inserts a nested type into its declaring type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateType`] if the full name is taken and [`Error::TypeNotFound`]
    /// if the declaring type of a nested type does not exist.
    pub fn add_type(&mut self, full_name: &str, mut ty: TypeDef) -> Result<Token> {
        if self.contains_type(full_name) {
            return Err(Error::DuplicateType(full_name.to_string()));
        }

        let index = match full_name.rsplit_once('/') {
            Some((parent, nested_name)) => {
                ty.namespace.clear();
                ty.name = nested_name.to_string();
                let parent_ty = self
                    .find_type_mut(parent)
                    .ok_or_else(|| Error::TypeNotFound(parent.to_string()))?;
                parent_ty.nested_types.push(ty);
                self.assign_tokens();
                return self
                    .find_type(full_name)
                    .map(|t| t.token)
                    .ok_or_else(|| Error::TypeNotFound(full_name.to_string()));
            }
            None => {
                let (namespace, name) = split_full_name(full_name);
                ty.namespace = namespace.to_string();
                ty.name = name.to_string();
                self.types.push(ty);
                self.types.len() - 1
            }
        };

        self.assign_tokens();
        Ok(self.types[index].token)
    }

    /// Append a method to the type named `type_name` and assign its tokens.
    ///
    /// Returns the token and the index of the method inside the type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the type does not exist.
    pub fn add_method(&mut self, type_name: &str, method: MethodDef) -> Result<(Token, usize)> {
        let ty = self
            .find_type_mut(type_name)
            .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;
        ty.methods.push(method);
        let index = ty.methods.len() - 1;
        self.assign_tokens();

        let token = self
            .find_type(type_name)
            .map(|t| t.methods[index].token)
            .unwrap_or_default();
        Ok((token, index))
    }

    /// Append a field to the type named `type_name` and assign its token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the type does not exist.
    pub fn add_field(&mut self, type_name: &str, field: FieldDef) -> Result<Token> {
        let ty = self
            .find_type_mut(type_name)
            .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;
        ty.fields.push(field);
        let index = ty.fields.len() - 1;
        self.assign_tokens();

        Ok(self
            .find_type(type_name)
            .map(|t| t.fields[index].token)
            .unwrap_or_default())
    }

    /// Assign tokens to every definition that does not have one yet.
    ///
    /// Existing tokens are never changed.
    pub fn assign_tokens(&mut self) {
        fn assign(ty: &mut TypeDef, tokens: &mut TokenAllocator) {
            if ty.token.is_null() {
                ty.token = tokens.next(token::TYPE_DEF);
            }
            for field in &mut ty.fields {
                if field.token.is_null() {
                    field.token = tokens.next(token::FIELD);
                }
            }
            for method in &mut ty.methods {
                if method.token.is_null() {
                    method.token = tokens.next(token::METHOD_DEF);
                }
                for param in &mut method.params {
                    if param.token.is_null() {
                        param.token = tokens.next(token::PARAM);
                    }
                }
            }
            for property in &mut ty.properties {
                if property.token.is_null() {
                    property.token = tokens.next(token::PROPERTY);
                }
            }
            for event in &mut ty.events {
                if event.token.is_null() {
                    event.token = tokens.next(token::EVENT);
                }
            }
            for nested in &mut ty.nested_types {
                assign(nested, tokens);
            }
        }

        let Module { types, tokens, .. } = self;
        for ty in types.iter_mut() {
            assign(ty, tokens);
        }
    }

    /// Seed the token allocator from the tokens already present.
    ///
    /// Called after decoding so later insertions continue after the highest existing row.
    pub fn observe_tokens(&mut self) {
        fn observe(ty: &TypeDef, tokens: &mut TokenAllocator) {
            tokens.observe(ty.token);
            ty.fields.iter().for_each(|f| tokens.observe(f.token));
            for method in &ty.methods {
                tokens.observe(method.token);
                method.params.iter().for_each(|p| tokens.observe(p.token));
            }
            ty.properties.iter().for_each(|p| tokens.observe(p.token));
            ty.events.iter().for_each(|e| tokens.observe(e.token));
            for nested in &ty.nested_types {
                observe(nested, tokens);
            }
        }

        let Module { types, tokens, .. } = self;
        for ty in types.iter() {
            observe(ty, tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::{MethodAttributes, ParamDef},
        signatures::TypeSig,
        typedef::{FieldAttributes, TypeAttributes},
    };

    fn module() -> Module {
        let mut module = Module::new("Game");
        let mut player = TypeDef::new("", "", TypeAttributes::PUBLIC, None);
        player
            .methods
            .push(MethodDef::new("Tick", MethodAttributes::PUBLIC, TypeSig::Void));
        module.add_type("Game.Player", player).unwrap();
        module
            .add_type(
                "Game.Player/Stats",
                TypeDef::new("", "", TypeAttributes::NESTED_PUBLIC, None),
            )
            .unwrap();
        module
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let module = module();
        assert!(module.contains_type("Game.Player"));
        assert!(module.contains_type("Game.Player/Stats"));
        assert!(!module.contains_type("game.player"));
        assert!(!module.contains_type("Player"));
        assert!(!module.contains_type("Game.Player/Missing"));
    }

    #[test]
    fn tokens_are_assigned_on_insertion() {
        let module = module();
        let player = module.find_type("Game.Player").unwrap();
        assert_eq!(player.token, Token(0x0200_0001));
        assert_eq!(player.methods[0].token, Token(0x0600_0001));
        assert_eq!(player.nested_types[0].token, Token(0x0200_0002));
        assert_eq!(player.nested_types[0].namespace, "");
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut module = module();
        let result = module.add_type(
            "Game.Player",
            TypeDef::new("", "", TypeAttributes::PUBLIC, None),
        );
        assert!(matches!(result, Err(Error::DuplicateType(_))));
    }

    #[test]
    fn add_method_and_field() {
        let mut module = module();
        let mut heal = MethodDef::new("Heal", MethodAttributes::PUBLIC, TypeSig::Void);
        heal.params.push(ParamDef::new("amount", 1, TypeSig::I4));
        let (token, index) = module.add_method("Game.Player", heal).unwrap();
        assert_eq!(token, Token(0x0600_0002));
        assert_eq!(index, 1);
        assert_eq!(
            module.find_type("Game.Player").unwrap().methods[1].params[0].token,
            Token(0x0800_0001)
        );

        let field = FieldDef::new("hp", FieldAttributes::PRIVATE, TypeSig::I4);
        assert_eq!(
            module.add_field("Game.Player/Stats", field).unwrap(),
            Token(0x0400_0001)
        );
        assert!(module.add_field("Game.Npc", FieldDef::new("x", FieldAttributes::PUBLIC, TypeSig::I4)).is_err());
    }

    #[test]
    fn walk_lists_nested_after_outer() {
        let module = module();
        let names: Vec<_> = module.walk_types().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Game.Player", "Game.Player/Stats"]);
    }

    #[test]
    fn observed_tokens_are_not_reused() {
        let mut module = Module::new("Game");
        let mut ty = TypeDef::new("Game", "Npc", TypeAttributes::PUBLIC, None);
        ty.token = Token(0x0200_0007);
        module.types.push(ty);
        module.observe_tokens();
        let token = module
            .add_type("Game.Door", TypeDef::new("", "", TypeAttributes::PUBLIC, None))
            .unwrap();
        assert_eq!(token, Token(0x0200_0008));
    }

    #[test]
    fn method_by_token_reports_owner() {
        let module = module();
        let (owner, method) = module.method_by_token(Token(0x0600_0001)).unwrap();
        assert_eq!(owner, "Game.Player");
        assert_eq!(method.name, "Tick");
    }
}
