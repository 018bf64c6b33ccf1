//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    path::{Path, PathBuf},
};

use dotsplice::{
    assembly::{builder::BodyBuilder, instruction::Operand, opcodes},
    image,
    metadata::{
        body::MethodBody,
        builders::{MethodBuilder, TypeBuilder},
        members::{FieldRef, MethodRef},
        signatures::{MethodSig, TypeRef, TypeSig},
        typedef::{FieldAttributes, TypeDef},
        Module,
    },
    patcher::{Compiler, Decompiler, Diagnostic, ModuleReference, ModuleStorage, ReferenceSet},
    Result,
};

/// Decompiled source of `Game.Player` as the decompiler would print it.
pub const PLAYER_SOURCE: &str = r#"using System;

namespace Game
{
    public class Player
    {
        private int health;

        public void Tick()
        {
        }

        public void Log()
        {
        }

        public void Log(string text)
        {
            Console.WriteLine(text);
        }

        public void Heal(int amount)
        {
            health += amount;
        }

        public class Stats
        {
            public void Reset()
            {
            }
        }
    }
}
"#;

pub fn ret_body() -> MethodBody {
    let mut body = BodyBuilder::new();
    body.emit(opcodes::RET).unwrap();
    body.finish().unwrap()
}

pub fn player_ref() -> TypeSig {
    TypeSig::Class(TypeRef::local("Game", "Player"))
}

pub fn write_line() -> Operand {
    Operand::Method(MethodRef::new(
        TypeSig::Class(TypeRef::external("mscorlib", "System", "Console")),
        "WriteLine",
        MethodSig::new_static(TypeSig::Void, vec![TypeSig::String]),
    ))
}

pub fn call_on_player(name: &str, params: Vec<TypeSig>) -> Operand {
    Operand::Method(MethodRef::new(
        player_ref(),
        name,
        MethodSig::new_instance(TypeSig::Void, params),
    ))
}

pub fn corlib() -> Module {
    let mut module = Module::new("mscorlib");
    module
        .add_type(
            "System.Object",
            TypeBuilder::class("System.Object")
                .base(None)
                .method(MethodBuilder::new(".ctor").build())
                .method(MethodBuilder::new("ToString").returns(TypeSig::String).build())
                .build(),
        )
        .unwrap();
    module
        .add_type("System.ValueType", TypeBuilder::class("System.ValueType").build())
        .unwrap();
    module
        .add_type(
            "System.Enum",
            TypeBuilder::class("System.Enum")
                .base(Some(TypeSig::Class(TypeRef::local("System", "ValueType"))))
                .build(),
        )
        .unwrap();
    module
        .add_type(
            "System.Exception",
            TypeBuilder::class("System.Exception")
                .method(MethodBuilder::new(".ctor").build())
                .build(),
        )
        .unwrap();
    module
        .add_type(
            "System.Console",
            TypeBuilder::class("System.Console")
                .method(
                    MethodBuilder::new("WriteLine")
                        .static_method()
                        .param("value", TypeSig::String)
                        .build(),
                )
                .build(),
        )
        .unwrap();
    module
}

pub fn corlib_references() -> ReferenceSet {
    let mut set = ReferenceSet::new();
    set.push(ModuleReference {
        name: "mscorlib".into(),
        path: PathBuf::from("game/mscorlib.dll"),
        module: corlib(),
        is_working_copy: false,
    });
    set
}

/// `Game.Player` as compiled from [`PLAYER_SOURCE`].
pub fn player_type() -> TypeDef {
    let health = Operand::Field(FieldRef::new(player_ref(), "health", TypeSig::I4));

    let mut log = BodyBuilder::new();
    log.emit(opcodes::LDARG_1).unwrap();
    log.emit_with(opcodes::CALL, write_line()).unwrap();
    log.emit(opcodes::RET).unwrap();

    let mut heal = BodyBuilder::new();
    heal.emit(opcodes::LDARG_0).unwrap();
    heal.emit(opcodes::LDARG_0).unwrap();
    heal.emit_with(opcodes::LDFLD, health.clone()).unwrap();
    heal.emit(opcodes::LDARG_1).unwrap();
    heal.emit(opcodes::ADD).unwrap();
    heal.emit_with(opcodes::STFLD, health).unwrap();
    heal.emit(opcodes::RET).unwrap();

    TypeBuilder::class("Game.Player")
        .field("health", FieldAttributes::PRIVATE, TypeSig::I4)
        .method(MethodBuilder::new("Tick").body(ret_body()).build())
        .method(MethodBuilder::new("Log").body(ret_body()).build())
        .method(
            MethodBuilder::new("Log")
                .param("text", TypeSig::String)
                .body(log.finish().unwrap())
                .build(),
        )
        .method(
            MethodBuilder::new("Heal")
                .param("amount", TypeSig::I4)
                .body(heal.finish().unwrap())
                .build(),
        )
        .nested(
            TypeBuilder::class("Game.Stats")
                .method(MethodBuilder::new("Reset").body(ret_body()).build())
                .build(),
        )
        .build()
}

/// The target module: `Game.Player` and the enum `Game.Color { Red = 0, Green = 2 }`.
pub fn game_module() -> Module {
    let mut module = Module::new("Game");
    module.add_type("Game.Player", player_type()).unwrap();
    module
        .add_type(
            "Game.Color",
            TypeBuilder::enumeration("Game.Color", TypeSig::I4)
                .enum_member("Red", 0)
                .enum_member("Green", 2)
                .build(),
        )
        .unwrap();
    module
}

/// Names and values of the members of an enum type.
pub fn enum_members(module: &Module, name: &str) -> Vec<(String, i64)> {
    let ty = module.find_type(name).unwrap();
    ty.fields
        .iter()
        .filter(|f| f.is_static_literal())
        .map(|f| {
            let value = f.constant.as_ref().and_then(|c| c.as_i64()).unwrap();
            (f.name.clone(), value)
        })
        .collect()
}

/// Write `mscorlib.dll` and `Game.dll` into `directory` of `storage`, returning the target path.
pub fn install_game(storage: &dyn ModuleStorage, directory: &Path) -> Result<PathBuf> {
    storage.write(&directory.join("mscorlib.dll"), &image::write_module(&corlib())?)?;
    let target = directory.join("Game.dll");
    storage.write(&target, &image::write_module(&game_module())?)?;
    Ok(target)
}

/// A compiler handing out prepared modules for sources containing a marker.
#[derive(Default)]
pub struct ScriptedCompiler {
    outputs: Vec<(String, Module)>,
    calls: Cell<usize>,
    sources: RefCell<Vec<String>>,
}

impl ScriptedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, marker: &str, module: Module) -> Self {
        self.outputs.push((marker.to_string(), module));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_source(&self) -> Option<String> {
        self.sources.borrow().last().cloned()
    }
}

impl Compiler for ScriptedCompiler {
    fn compile(
        &self,
        source: &str,
        _references: &ReferenceSet,
    ) -> std::result::Result<Vec<u8>, Vec<Diagnostic>> {
        self.calls.set(self.calls.get() + 1);
        self.sources.borrow_mut().push(source.to_string());
        match self.outputs.iter().find(|(marker, _)| source.contains(marker)) {
            Some((_, module)) => image::write_module(module)
                .map_err(|e| vec![Diagnostic::error("DS0001", e.to_string(), 1, 1)]),
            None => Err(vec![Diagnostic::error(
                "CS0246",
                "The type or namespace name could not be found",
                1,
                1,
            )]),
        }
    }
}

/// A decompiler that always prints [`PLAYER_SOURCE`] for `Game.Player`.
pub struct PlayerDecompiler;

impl Decompiler for PlayerDecompiler {
    fn decompile(&self, _module: &Module, type_name: &str) -> std::result::Result<String, String> {
        match type_name {
            "Game.Player" => Ok(PLAYER_SOURCE.to_string()),
            other => Err(format!("cannot decompile '{other}'")),
        }
    }
}
