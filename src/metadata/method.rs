//! Method and parameter definitions.

use bitflags::bitflags;

use crate::metadata::{
    body::MethodBody,
    constant::Constant,
    customattributes::CustomAttribute,
    signatures::{MethodSig, TypeSig},
    token::Token,
    typedef::GenericParam,
};

bitflags! {
    /// Method attributes (ECMA-335 II.23.1.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAttributes: u16 {
        /// Mask selecting the accessibility bits
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types in the same module
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible within the module
        const ASSEMBLY = 0x0003;
        /// Accessible by sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types and within the module
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by everyone
        const PUBLIC = 0x0006;
        /// Defined on the type rather than per instance
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Virtual
        const VIRTUAL = 0x0040;
        /// Hidden by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Overridable only if accessible
        const STRICT = 0x0200;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Special name
        const SPECIAL_NAME = 0x0800;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x1000;
        /// Implemented through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

impl MethodAttributes {
    /// Accessibility keyword.
    #[must_use]
    pub fn access(&self) -> &'static str {
        match self.bits() & Self::MEMBER_ACCESS_MASK.bits() {
            0x1 => "private",
            0x2 => "famandassem",
            0x3 => "assembly",
            0x4 => "family",
            0x5 => "famorassem",
            0x6 => "public",
            _ => "compilercontrolled",
        }
    }
}

bitflags! {
    /// Method implementation attributes (ECMA-335 II.23.1.11).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodImplAttributes: u16 {
        /// Native code
        const NATIVE = 0x0001;
        /// Provided by the runtime
        const RUNTIME = 0x0003;
        /// Unmanaged code
        const UNMANAGED = 0x0004;
        /// Must not be inlined
        const NO_INLINING = 0x0008;
        /// Declared but not implemented
        const FORWARD_REF = 0x0010;
        /// Single-threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Must not be optimised
        const NO_OPTIMIZATION = 0x0040;
        /// Signature is exported as declared
        const PRESERVE_SIG = 0x0080;
        /// Should be inlined
        const AGGRESSIVE_INLINING = 0x0100;
        /// Internal call
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// Parameter attributes (ECMA-335 II.23.1.13).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParamAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Parameter name
    pub name: String,
    /// One-based position
    pub sequence: u16,
    /// Attributes
    pub flags: ParamAttributes,
    /// Declared type
    pub param_type: TypeSig,
    /// Default value
    pub constant: Option<Constant>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParamDef {
    /// A parameter at `sequence` without attributes.
    pub fn new(name: impl Into<String>, sequence: u16, param_type: TypeSig) -> Self {
        ParamDef {
            token: Token::NULL,
            name: name.into(),
            sequence,
            flags: ParamAttributes::empty(),
            param_type,
            constant: None,
            custom_attributes: Vec::new(),
        }
    }
}

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Method name
    pub name: String,
    /// Attributes
    pub flags: MethodAttributes,
    /// Implementation attributes
    pub impl_flags: MethodImplAttributes,
    /// Return type
    pub return_type: TypeSig,
    /// Declared parameters in order
    pub params: Vec<ParamDef>,
    /// Generic method parameters
    pub generic_params: Vec<GenericParam>,
    /// Body, `None` for abstract and runtime-provided methods
    pub body: Option<MethodBody>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl MethodDef {
    /// A method without parameters or body.
    pub fn new(name: impl Into<String>, flags: MethodAttributes, return_type: TypeSig) -> Self {
        MethodDef {
            token: Token::NULL,
            name: name.into(),
            flags,
            impl_flags: MethodImplAttributes::empty(),
            return_type,
            params: Vec::new(),
            generic_params: Vec::new(),
            body: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Whether the method is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Whether the method receives `this` in argument slot 0.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.is_static()
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Number of argument slots, including `this`.
    #[must_use]
    pub fn arg_slot_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this())
    }

    /// Whether this method is named `name` and declares `param_count` parameters.
    #[must_use]
    pub fn matches(&self, name: &str, param_count: usize) -> bool {
        self.name == name && self.params.len() == param_count
    }

    /// The signature of this method.
    #[must_use]
    pub fn signature(&self) -> MethodSig {
        MethodSig {
            has_this: self.has_this(),
            generic_param_count: u32::try_from(self.generic_params.len()).unwrap_or(u32::MAX),
            return_type: self.return_type.clone(),
            params: self.params.iter().map(|p| p.param_type.clone()).collect(),
            ..Default::default()
        }
    }
}
