//! Binary module images.
//!
//! An image is the persisted form of a [`crate::metadata::Module`]. It is what the storage
//! collaborator reads and writes and what the external compiler produces.
//!
//! # Layout
//!
//! | Part              | Encoding                                                   |
//! |-------------------|------------------------------------------------------------|
//! | magic             | `DSMI`                                                     |
//! | version           | `u16`                                                      |
//! | mvid              | 16 bytes                                                   |
//! | string heap       | `u32` length, null-terminated UTF-8, index 0 is empty      |
//! | user-string heap  | `u32` length, compressed-length-prefixed UTF-16LE blobs   |
//! | module name       | string index                                               |
//! | type tree         | compressed count, then each type definition recursively    |
//!
//! Variable-size integers use the ECMA-335 compressed encoding, signatures use ECMA-335
//! element type codes (see [`sig::element`]) and instruction operands follow the shape of their
//! opcode, with branch targets stored as instruction indices.
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::{
//!     image,
//!     metadata::{builders::TypeBuilder, Module},
//! };
//!
//! let mut module = Module::new("Game");
//! module.add_type("Game.Player", TypeBuilder::class("Game.Player").build())?;
//!
//! let bytes = image::write_module(&module)?;
//! assert_eq!(image::read_module(&bytes)?, module);
//! # Ok::<(), dotsplice::Error>(())
//! ```

pub mod heap;
mod reader;
pub mod sig;
mod writer;

pub use reader::read_module;
pub use writer::write_module;

/// Leading bytes of every image.
pub const MAGIC: &[u8; 4] = b"DSMI";

/// Current format version.
pub const VERSION: u16 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{
            builder::BodyBuilder,
            instruction::{Immediate, Operand},
            opcodes,
        },
        metadata::{
            builders::{MethodBuilder, TypeBuilder},
            constant::Constant,
            customattributes::{AttributeArgument, AttributeValue, CustomAttribute},
            members::{FieldRef, MethodRef},
            signatures::{MethodSig, TypeRef, TypeSig},
            typedef::FieldAttributes,
            Module,
        },
        Error,
    };

    fn game_module() -> Module {
        let player = TypeRef::local("Game", "Player");

        let mut b = BodyBuilder::new();
        let counter = b.local(TypeSig::I4);
        b.define_label("try").unwrap();
        b.emit(opcodes::LDARG_0).unwrap();
        b.emit_with(
            opcodes::LDFLD,
            Operand::Field(FieldRef::new(
                TypeSig::Class(player.clone()),
                "health",
                TypeSig::I4,
            )),
        )
        .unwrap();
        b.emit_with(opcodes::STLOC_S, Operand::Local(counter)).unwrap();
        b.emit_with(opcodes::LDSTR, Operand::String("caf\u{e9}".into()))
            .unwrap();
        b.emit_with(
            opcodes::CALL,
            Operand::Method(MethodRef::new(
                TypeSig::Class(TypeRef::external("mscorlib", "System", "Console")),
                "WriteLine",
                MethodSig::new_static(TypeSig::Void, vec![TypeSig::String]),
            )),
        )
        .unwrap();
        b.emit_branch(opcodes::LEAVE_S, "end").unwrap();
        b.define_label("handler").unwrap();
        b.emit(opcodes::POP).unwrap();
        b.emit_with(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(-7)))
            .unwrap();
        b.emit(opcodes::POP).unwrap();
        b.emit_branch(opcodes::LEAVE_S, "end").unwrap();
        b.define_label("end").unwrap();
        b.emit(opcodes::RET).unwrap();
        b.catch_handler(
            "try",
            "handler",
            "handler",
            "end",
            TypeSig::Class(TypeRef::external("mscorlib", "System", "Exception")),
        );

        let mut attribute = CustomAttribute::new(MethodRef::new(
            TypeSig::Class(TypeRef::external("mscorlib", "System", "ObsoleteAttribute")),
            ".ctor",
            MethodSig::new_instance(TypeSig::Void, vec![TypeSig::String]),
        ));
        attribute.fixed_args.push(AttributeArgument::new(
            TypeSig::String,
            AttributeValue::String(Some("use Heal".into())),
        ));

        let ty = TypeBuilder::class("Game.Player")
            .field("health", FieldAttributes::PRIVATE, TypeSig::I4)
            .method(
                MethodBuilder::new("Tick")
                    .body(b.finish().unwrap())
                    .attribute(attribute)
                    .build(),
            )
            .nested(
                TypeBuilder::enumeration("Game.Mood", TypeSig::U1)
                    .enum_member("Calm", 0)
                    .build(),
            )
            .build();

        let mut module = Module::new("Game");
        module.mvid = uguid::guid!("01234567-89ab-cdef-0123-456789abcdef");
        module.add_type("Game.Player", ty).unwrap();
        module
    }

    #[test]
    fn round_trip_preserves_module() {
        let module = game_module();
        let bytes = write_module(&module).unwrap();
        assert_eq!(&bytes[..4], MAGIC);

        let decoded = read_module(&bytes).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(
            decoded.find_type("Game.Player/Mood").unwrap().fields[1].constant,
            Some(Constant::U1(0))
        );
    }

    #[test]
    fn decoded_module_continues_token_allocation() {
        let module = game_module();
        let mut decoded = read_module(&write_module(&module).unwrap()).unwrap();
        let token = decoded
            .add_type("Game.Door", TypeBuilder::class("Game.Door").build())
            .unwrap();
        assert_eq!(token.row(), 3);
    }

    #[test]
    fn rejects_foreign_data() {
        assert!(matches!(read_module(&[]), Err(Error::Empty)));
        assert!(matches!(
            read_module(b"MZ\x90\x00\x03\x00"),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = write_module(&game_module()).unwrap();
        for len in [5, 20, bytes.len() / 2, bytes.len() - 1] {
            assert!(read_module(&bytes[..len]).is_err(), "length {len}");
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = write_module(&game_module()).unwrap();
        bytes.push(0);
        assert!(matches!(read_module(&bytes), Err(Error::Malformed { .. })));
    }

    #[test]
    fn rejects_mismatched_operand() {
        let mut module = game_module();
        let body = module.types[0].methods[0].body.as_mut().unwrap();
        body.instructions[0].operand = Operand::String("oops".into());
        assert!(matches!(write_module(&module), Err(Error::Structural(_))));
    }
}
