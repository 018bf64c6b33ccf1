//! Structural scanning of source fragments.
//!
//! [`Fragment::parse`] recovers just enough structure from C#-style source to drive a patch:
//! the `using` directives, the namespace, every type declaration with its methods and nested
//! types, and the members of enums. Declarations are located by byte span so the merge step can
//! splice source text without re-printing it.

use std::ops::Range;

use strum::Display;

use crate::{
    source::lexer::{tokenize, SourceToken, TokenKind},
    Error, Result,
};

/// Keyword that introduced a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TypeKind {
    /// `class`
    Class,
    /// `struct`
    Struct,
    /// `interface`
    Interface,
    /// `record`, `record class` or `record struct`
    Record,
    /// `enum`
    Enum,
}

impl TypeKind {
    fn from_keyword(keyword: &str) -> Option<TypeKind> {
        match keyword {
            "class" => Some(TypeKind::Class),
            "struct" => Some(TypeKind::Struct),
            "interface" => Some(TypeKind::Interface),
            "record" => Some(TypeKind::Record),
            "enum" => Some(TypeKind::Enum),
            _ => None,
        }
    }
}

/// A `namespace` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Dotted namespace name
    pub name: String,
    /// Declared with a trailing `;` instead of a block
    pub file_scoped: bool,
}

/// A method declaration inside a type body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Method name without generic parameters
    pub name: String,
    /// Number of declared parameters
    pub param_count: usize,
    /// Attributes, modifiers, signature and body
    pub span: Range<usize>,
    /// The leading attribute lists, if any
    pub attributes: Option<Range<usize>>,
    /// Where the declaration continues after its attribute lists
    pub header_start: usize,
}

/// A member of an enum declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMemberDecl {
    /// Member name
    pub name: String,
    /// Explicit value, present only when the initializer is an integer literal
    pub value: Option<i64>,
}

/// A type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    /// Declaring keyword
    pub kind: TypeKind,
    /// Simple name, with a `` `N `` arity suffix for generic types
    pub name: String,
    /// Namespace-qualified name, nested types as `Outer/Inner`
    pub full_name: String,
    /// Attributes, modifiers, header and body
    pub span: Range<usize>,
    /// Text between the braces of the body
    pub body: Range<usize>,
    /// Methods declared directly in this type
    pub methods: Vec<MethodDecl>,
    /// Members of an enum
    pub enum_members: Vec<EnumMemberDecl>,
    /// Nested type declarations
    pub nested: Vec<TypeDecl>,
}

impl TypeDecl {
    /// The first method called `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether more than one method is called `name`.
    #[must_use]
    pub fn is_overloaded(&self, name: &str) -> bool {
        self.methods.iter().filter(|m| m.name == name).count() > 1
    }

    /// Whether this type or any of its nested types declares a method.
    #[must_use]
    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty() || self.nested.iter().any(TypeDecl::has_methods)
    }

    /// This type and all nested types, outer first.
    #[must_use]
    pub fn walk(&self) -> Vec<&TypeDecl> {
        let mut out = vec![self];
        for nested in &self.nested {
            out.extend(nested.walk());
        }
        out
    }

    /// Find this type or a nested type by full name.
    #[must_use]
    pub fn find(&self, full_name: &str) -> Option<&TypeDecl> {
        self.walk().into_iter().find(|t| t.full_name == full_name)
    }
}

/// A scanned source fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The source text all spans refer to
    pub source: String,
    /// `using` directives, trimmed, in declaration order
    pub usings: Vec<String>,
    /// The namespace wrapping the types, if any
    pub namespace: Option<NamespaceDecl>,
    /// Top-level type declarations
    pub types: Vec<TypeDecl>,
}

impl Fragment {
    /// Scan `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFragment`] if the text cannot be tokenized, braces do not balance
    /// or something other than usings, a namespace and type declarations appears at top level.
    pub fn parse(source: &str) -> Result<Fragment> {
        let tokens = tokenize(source)?;
        let mut scanner = Scanner {
            source,
            tokens: &tokens,
            usings: Vec::new(),
            namespace: None,
        };
        let types = scanner.compilation_unit()?;
        Ok(Fragment {
            source: source.to_string(),
            usings: scanner.usings,
            namespace: scanner.namespace,
            types,
        })
    }

    /// Source text of `span`.
    #[must_use]
    pub fn text(&self, span: &Range<usize>) -> &str {
        &self.source[span.clone()]
    }

    /// Find a type declaration, nested or not, by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDecl> {
        self.types.iter().find_map(|t| t.find(full_name))
    }

    /// Name of the namespace, empty for the global namespace.
    #[must_use]
    pub fn namespace_name(&self) -> &str {
        self.namespace.as_ref().map_or("", |ns| ns.name.as_str())
    }
}

const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "internal",
    "static",
    "sealed",
    "abstract",
    "partial",
    "unsafe",
    "readonly",
    "new",
    "file",
    "ref",
];

struct Scanner<'a> {
    source: &'a str,
    tokens: &'a [SourceToken],
    usings: Vec<String>,
    namespace: Option<NamespaceDecl>,
}

impl Scanner<'_> {
    fn text(&self, index: usize) -> &str {
        self.tokens[index].text(self.source)
    }

    fn is_ident(&self, index: usize, word: &str) -> bool {
        index < self.tokens.len()
            && self.tokens[index].kind == TokenKind::Ident
            && self.text(index) == word
    }

    fn is_punct(&self, index: usize, c: char) -> bool {
        self.tokens.get(index).is_some_and(|t| t.is_punct(c))
    }

    fn invalid(&self, index: usize, what: &str) -> Error {
        match self.tokens.get(index) {
            Some(token) => Error::InvalidFragment(format!(
                "{what} at line {}: '{}'",
                token.line,
                token.text(self.source)
            )),
            None => Error::InvalidFragment(format!("{what} at end of input")),
        }
    }

    /// Index of the token closing the bracket opened at `open`.
    fn matching(&self, open: usize) -> Result<usize> {
        let (opening, closing) = match self.tokens[open].kind {
            TokenKind::Punct('{') => ('{', '}'),
            TokenKind::Punct('(') => ('(', ')'),
            TokenKind::Punct('[') => ('[', ']'),
            _ => return Err(self.invalid(open, "Expected an opening bracket")),
        };
        let mut depth = 0usize;
        for index in open..self.tokens.len() {
            if self.tokens[index].is_punct(opening) {
                depth += 1;
            } else if self.tokens[index].is_punct(closing) {
                depth -= 1;
                if depth == 0 {
                    return Ok(index);
                }
            }
        }
        Err(self.invalid(open, "Unbalanced bracket"))
    }

    /// Index of the next `;` outside brackets, starting at `from` and stopping before `end`.
    fn statement_end(&self, from: usize, end: usize) -> Result<usize> {
        let mut index = from;
        while index < end {
            match self.tokens[index].kind {
                TokenKind::Punct(';') => return Ok(index),
                TokenKind::Punct('{' | '(' | '[') => index = self.matching(index)? + 1,
                _ => index += 1,
            }
        }
        Err(self.invalid(from, "Missing ';'"))
    }

    fn span(&self, first: usize, last: usize) -> Range<usize> {
        self.tokens[first].span.start..self.tokens[last].span.end
    }

    fn compilation_unit(&mut self) -> Result<Vec<TypeDecl>> {
        let mut types = Vec::new();
        let mut index = 0;
        let end = self.tokens.len();
        let mut namespace_close = None;

        while index < end {
            if Some(index) == namespace_close {
                index += 1;
                continue;
            }

            if self.is_ident(index, "using") || self.is_ident(index, "global") {
                let stop = self.statement_end(index, end)?;
                let text = self.source[self.span(index, stop)].trim().to_string();
                self.usings.push(text);
                index = stop + 1;
            } else if self.is_ident(index, "extern") && self.is_ident(index + 1, "alias") {
                index = self.statement_end(index, end)? + 1;
            } else if self.is_ident(index, "namespace") {
                if self.namespace.is_some() {
                    return Err(self.invalid(index, "Only one namespace is supported"));
                }
                let (name, next) = self.dotted_name(index + 1)?;
                if self.is_punct(next, ';') {
                    self.namespace = Some(NamespaceDecl {
                        name,
                        file_scoped: true,
                    });
                    index = next + 1;
                } else if self.is_punct(next, '{') {
                    namespace_close = Some(self.matching(next)?);
                    self.namespace = Some(NamespaceDecl {
                        name,
                        file_scoped: false,
                    });
                    index = next + 1;
                } else {
                    return Err(self.invalid(next, "Expected namespace body"));
                }
            } else if self.is_punct(index, '[')
                && self.is_ident(index + 1, "assembly")
                && self.is_punct(index + 2, ':')
            {
                index = self.matching(index)? + 1;
            } else if self.is_punct(index, ';') {
                index += 1;
            } else if namespace_close.is_some_and(|close| index > close) {
                return Err(self.invalid(
                    index,
                    "Declaration outside the namespace (everything must be inside the namespace block)",
                ));
            } else {
                let limit = namespace_close.unwrap_or(end);
                let prefix = self.namespace_name();
                match self.type_declaration(index, limit, &prefix, None)? {
                    Some((decl, next)) => {
                        if let Some(decl) = decl {
                            types.push(decl);
                        }
                        index = next;
                    }
                    None => {
                        return Err(self.invalid(
                            index,
                            "Expected a type declaration (methods must be declared inside their class)",
                        ));
                    }
                }
            }
        }
        Ok(types)
    }

    fn namespace_name(&self) -> String {
        self.namespace
            .as_ref()
            .map(|ns| ns.name.clone())
            .unwrap_or_default()
    }

    fn dotted_name(&self, start: usize) -> Result<(String, usize)> {
        let mut name = String::new();
        let mut index = start;
        loop {
            match self.tokens.get(index) {
                Some(t) if t.kind == TokenKind::Ident => name.push_str(t.text(self.source)),
                _ => return Err(self.invalid(index, "Expected a name")),
            }
            index += 1;
            if self.is_punct(index, '.') {
                name.push('.');
                index += 1;
            } else {
                return Ok((name, index));
            }
        }
    }

    /// Skip attribute lists starting at `index`. Returns the index after them and the index of
    /// the last `]`, if there were any.
    fn attributes(&self, mut index: usize, end: usize) -> Result<(usize, Option<usize>)> {
        let mut last = None;
        while index < end && self.is_punct(index, '[') {
            let close = self.matching(index)?;
            last = Some(close);
            index = close + 1;
        }
        Ok((index, last))
    }

    /// Try to read a type declaration at `start`.
    ///
    /// Returns `None` if the tokens at `start` do not declare a type, otherwise the declaration
    /// (absent for bodiless declarations such as positional records) and the index after it.
    #[allow(clippy::type_complexity)]
    fn type_declaration(
        &self,
        start: usize,
        end: usize,
        namespace: &str,
        parent: Option<&str>,
    ) -> Result<Option<(Option<TypeDecl>, usize)>> {
        let (mut index, _) = self.attributes(start, end)?;
        while index < end && MODIFIERS.contains(&self.text(index)) {
            index += 1;
        }
        if index >= end {
            return Ok(None);
        }

        let Some(kind) = TypeKind::from_keyword(self.text(index)) else {
            return Ok(None);
        };
        if kind == TypeKind::Record
            && (self.is_ident(index + 1, "class") || self.is_ident(index + 1, "struct"))
        {
            index += 1;
        }
        index += 1;
        if self.tokens.get(index).map(|t| t.kind) != Some(TokenKind::Ident) {
            return Ok(None);
        }
        let mut name = self.text(index).trim_start_matches('@').to_string();
        index += 1;

        let arity = self.generic_arity(&mut index, end);
        if arity > 0 {
            name = format!("{name}`{arity}");
        }

        let full_name = match parent {
            Some(parent) => format!("{parent}/{name}"),
            None if namespace.is_empty() => name.clone(),
            None => format!("{namespace}.{name}"),
        };

        // Base list, constraints and positional record parameters up to the body.
        while index < end && !self.is_punct(index, '{') && !self.is_punct(index, ';') {
            if self.is_punct(index, '(') || self.is_punct(index, '[') {
                index = self.matching(index)?;
            }
            index += 1;
        }
        if index >= end {
            return Err(self.invalid(start, "Unterminated type declaration"));
        }
        if self.is_punct(index, ';') {
            return Ok(Some((None, index + 1)));
        }

        let open = index;
        let close = self.matching(open)?;
        if close >= end {
            return Err(self.invalid(open, "Unbalanced type body"));
        }

        let mut decl = TypeDecl {
            kind,
            name,
            full_name,
            span: self.span(start, close),
            body: self.tokens[open].span.end..self.tokens[close].span.start,
            methods: Vec::new(),
            enum_members: Vec::new(),
            nested: Vec::new(),
        };

        if kind == TypeKind::Enum {
            decl.enum_members = self.enum_members(open + 1, close)?;
        } else {
            self.members(&mut decl, open + 1, close, namespace)?;
        }

        let mut next = close + 1;
        if self.is_punct(next, ';') {
            next += 1;
        }
        Ok(Some((Some(decl), next)))
    }

    /// Count the parameters of a `<...>` list at `index`, advancing past it.
    fn generic_arity(&self, index: &mut usize, end: usize) -> usize {
        if !self.is_punct(*index, '<') {
            return 0;
        }
        let mut depth = 0usize;
        let mut arity = 1;
        while *index < end {
            match self.tokens[*index].kind {
                TokenKind::Punct('<') => depth += 1,
                TokenKind::Punct('>') => {
                    depth -= 1;
                    if depth == 0 {
                        *index += 1;
                        return arity;
                    }
                }
                TokenKind::Punct(',') if depth == 1 => arity += 1,
                _ => {}
            }
            *index += 1;
        }
        arity
    }

    fn members(&self, decl: &mut TypeDecl, start: usize, end: usize, namespace: &str) -> Result<()> {
        let simple_name = decl
            .name
            .split('`')
            .next()
            .unwrap_or_default()
            .to_string();
        let mut index = start;

        while index < end {
            if self.is_punct(index, ';') {
                index += 1;
                continue;
            }

            if let Some((nested, next)) =
                self.type_declaration(index, end, namespace, Some(&decl.full_name))?
            {
                decl.nested.extend(nested);
                index = next;
                continue;
            }

            let member_start = index;
            let (header, last_attribute) = self.attributes(index, end)?;
            index = header;

            // Walk the header up to whatever decides the member's shape.
            let mut method_paren = None;
            let mut excluded = false;
            while index < end {
                match self.tokens[index].kind {
                    TokenKind::Punct('{' | ';') => break,
                    TokenKind::Punct('=') => break,
                    TokenKind::Punct('(') => {
                        method_paren = Some(index);
                        break;
                    }
                    TokenKind::Punct('[') => index = self.matching(index)? + 1,
                    TokenKind::Punct('~') => {
                        excluded = true;
                        index += 1;
                    }
                    TokenKind::Ident
                        if matches!(self.text(index), "operator" | "delegate" | "event") =>
                    {
                        excluded = true;
                        index += 1;
                    }
                    _ => index += 1,
                }
            }
            if index >= end {
                return Err(self.invalid(member_start, "Unterminated member"));
            }

            if let Some(paren) = method_paren {
                let name = self.method_name(paren, header);
                let close = self.matching(paren)?;
                let member_end = self.member_body_end(close + 1, end)?;
                let is_method = name
                    .as_deref()
                    .is_some_and(|n| n != simple_name && n != "this")
                    && !excluded;
                if let (true, Some(name)) = (is_method, name) {
                    decl.methods.push(MethodDecl {
                        name,
                        param_count: self.param_count(paren, close),
                        span: self.span(member_start, member_end),
                        attributes: last_attribute.map(|last| self.span(member_start, last)),
                        header_start: self.tokens[header].span.start,
                    });
                }
                index = member_end + 1;
            } else if self.is_punct(index, '{') {
                // Property or event accessors, optionally followed by an initializer.
                index = self.matching(index)? + 1;
                if self.is_punct(index, '=') {
                    index = self.statement_end(index, end)? + 1;
                }
            } else {
                index = self.statement_end(index, end)? + 1;
            }
        }
        Ok(())
    }

    /// Name of a method whose parameter list opens at `paren`.
    fn method_name(&self, paren: usize, header: usize) -> Option<String> {
        if paren == 0 || paren <= header {
            return None;
        }
        let mut index = paren - 1;
        if self.is_punct(index, '>') {
            let mut depth = 0usize;
            loop {
                if self.is_punct(index, '>') {
                    depth += 1;
                } else if self.is_punct(index, '<') {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                if index <= header {
                    return None;
                }
                index -= 1;
            }
            if index <= header {
                return None;
            }
            index -= 1;
        }
        let token = &self.tokens[index];
        (token.kind == TokenKind::Ident)
            .then(|| token.text(self.source).trim_start_matches('@').to_string())
    }

    fn param_count(&self, open: usize, close: usize) -> usize {
        if close == open + 1 {
            return 0;
        }
        let mut depth = 0i32;
        let mut angle = 0i32;
        let mut count = 1;
        for token in &self.tokens[open + 1..close] {
            match token.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => depth -= 1,
                TokenKind::Punct('<') => angle += 1,
                TokenKind::Punct('>') => angle = (angle - 1).max(0),
                TokenKind::Punct(',') if depth == 0 && angle == 0 => count += 1,
                _ => {}
            }
        }
        count
    }

    /// Index of the last token of a method whose parameter list ended just before `from`.
    fn member_body_end(&self, from: usize, end: usize) -> Result<usize> {
        let mut index = from;
        while index < end {
            match self.tokens[index].kind {
                TokenKind::Punct('{') => return self.matching(index),
                TokenKind::Punct(';') => return Ok(index),
                TokenKind::Punct('=') if self.is_punct(index + 1, '>') => {
                    return self.statement_end(index + 2, end);
                }
                TokenKind::Punct('(' | '[') => index = self.matching(index)? + 1,
                _ => index += 1,
            }
        }
        Err(self.invalid(from, "Missing method body"))
    }

    fn enum_members(&self, start: usize, end: usize) -> Result<Vec<EnumMemberDecl>> {
        let mut members = Vec::new();
        let mut index = start;
        while index < end {
            let (next, _) = self.attributes(index, end)?;
            index = next;
            if index >= end {
                break;
            }
            if self.tokens[index].kind != TokenKind::Ident {
                return Err(self.invalid(index, "Expected an enum member"));
            }
            let name = self.text(index).trim_start_matches('@').to_string();
            index += 1;

            let mut stop = index;
            let mut depth = 0i32;
            while stop < end {
                match self.tokens[stop].kind {
                    TokenKind::Punct('(' | '[' | '{') => depth += 1,
                    TokenKind::Punct(')' | ']' | '}') => depth -= 1,
                    TokenKind::Punct(',') if depth == 0 => break,
                    _ => {}
                }
                stop += 1;
            }

            let value = if self.is_punct(index, '=') {
                self.literal_value(index + 1, stop)?
            } else if index == stop {
                None
            } else {
                return Err(self.invalid(index, "Expected '=' or ','"));
            };
            members.push(EnumMemberDecl { name, value });
            index = stop + 1;
        }
        Ok(members)
    }

    /// The value of an initializer made of a single integer literal with an optional minus.
    fn literal_value(&self, start: usize, end: usize) -> Result<Option<i64>> {
        let (negative, number) = match end.saturating_sub(start) {
            1 => (false, start),
            2 if self.is_punct(start, '-') => (true, start + 1),
            _ => return Ok(None),
        };
        if self.tokens[number].kind != TokenKind::Number {
            return Ok(None);
        }
        match parse_integer(self.text(number), negative) {
            Some(value) => Ok(Some(value)),
            None if is_integer_literal(self.text(number)) => {
                Err(self.invalid(number, "Enum value out of range"))
            }
            None => Ok(None),
        }
    }
}

fn is_integer_literal(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.starts_with("0x") || lower.starts_with("0b") || !lower.contains(['.', 'e', 'f', 'd', 'm'])
}

/// Parse a C# integer literal: decimal, `0x` hex or `0b` binary, `_` separators and `u`/`l`
/// suffixes.
fn parse_integer(text: &str, negative: bool) -> Option<i64> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };
    let body = body.trim_end_matches(['u', 'l']);
    if body.is_empty() || (radix == 10 && !body.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    let magnitude = i128::from(u64::from_str_radix(body, radix).ok()?);
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}
