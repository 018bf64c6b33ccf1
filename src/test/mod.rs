//! Fixtures shared by the unit tests: small modules, a reference set and scripted collaborators.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::PathBuf,
};

use crate::{
    assembly::{builder::BodyBuilder, instruction::Operand, opcodes},
    image,
    metadata::{
        body::MethodBody,
        builders::{MethodBuilder, TypeBuilder},
        members::{FieldRef, MethodRef},
        signatures::{MethodSig, TypeRef, TypeSig},
        typedef::FieldAttributes,
        Module,
    },
    patcher::{
        external::{Compiler, Decompiler, Diagnostic},
        references::{ModuleReference, ReferenceSet},
    },
};

fn ret_body() -> MethodBody {
    let mut b = BodyBuilder::new();
    b.emit(opcodes::RET).unwrap();
    b.finish().unwrap()
}

fn corlib_type(name: &str) -> TypeRef {
    TypeRef::external("mscorlib", "System", name)
}

/// A call to `System.Console.WriteLine(string)`.
pub fn write_line() -> Operand {
    Operand::Method(MethodRef::new(
        TypeSig::Class(corlib_type("Console")),
        "WriteLine",
        MethodSig::new_static(TypeSig::Void, vec![TypeSig::String]),
    ))
}

/// The handful of `mscorlib` types the fixtures refer to.
pub fn corlib() -> Module {
    let mut module = Module::new("mscorlib");
    let object = TypeBuilder::class("System.Object")
        .base(None)
        .method(MethodBuilder::new(".ctor").build())
        .method(MethodBuilder::new("ToString").returns(TypeSig::String).build())
        .build();
    module.add_type("System.Object", object).unwrap();
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
                .method(MethodBuilder::new(".ctor").param("message", TypeSig::String).build())
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

/// A reference set holding only [`corlib`].
pub fn corlib_references() -> ReferenceSet {
    let mut set = ReferenceSet::new();
    set.push(ModuleReference {
        name: "mscorlib".into(),
        path: PathBuf::from("/game/mscorlib.dll"),
        module: corlib(),
        is_working_copy: false,
    });
    set
}

/// The patch target: `Game.Player` with a nested `Stats` type, and the enum `Game.Color`.
pub fn game_module() -> Module {
    let player_ref = TypeSig::Class(TypeRef::local("Game", "Player"));
    let health = Operand::Field(FieldRef::new(player_ref, "health", TypeSig::I4));

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

    let stats = TypeBuilder::class("Game.Stats")
        .method(MethodBuilder::new("Reset").body(ret_body()).build())
        .build();

    let player = TypeBuilder::class("Game.Player")
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
        .nested(stats)
        .build();

    let mut module = Module::new("Game");
    module.add_type("Game.Player", player).unwrap();
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

/// A compiled `Game.Player` whose `Helper` calls its sibling `Util`.
pub fn fresh_player_module() -> Module {
    let util = MethodRef::new(
        TypeSig::Class(TypeRef::local("Game", "Player")),
        "Util",
        MethodSig::new_instance(TypeSig::Void, vec![]),
    );
    let mut helper = BodyBuilder::new();
    helper.emit(opcodes::LDARG_0).unwrap();
    helper.emit_with(opcodes::CALL, Operand::Method(util)).unwrap();
    helper.emit(opcodes::RET).unwrap();

    let player = TypeBuilder::class("Game.Player")
        .method(MethodBuilder::new("Helper").body(helper.finish().unwrap()).build())
        .method(MethodBuilder::new("Util").body(ret_body()).build())
        .nested(TypeBuilder::class("Game.Stats").build())
        .build();

    let mut module = Module::new("Patch");
    module.add_type("Game.Player", player).unwrap();
    module
}

/// A compiled `Game.Npc` with a `Greet` method printing a line.
pub fn npc_module() -> Module {
    let mut greet = BodyBuilder::new();
    greet
        .emit_with(opcodes::LDSTR, Operand::String("hi".into()))
        .unwrap();
    greet.emit_with(opcodes::CALL, write_line()).unwrap();
    greet.emit(opcodes::RET).unwrap();

    let npc = TypeBuilder::class("Game.Npc")
        .method(MethodBuilder::new("Greet").body(greet.finish().unwrap()).build())
        .build();

    let mut module = Module::new("Patch");
    module.add_type("Game.Npc", npc).unwrap();
    module
}

/// A compiler that returns canned modules for sources containing a marker.
#[derive(Default)]
pub struct ScriptedCompiler {
    outputs: Vec<(String, Module)>,
    calls: Cell<usize>,
    sources: RefCell<Vec<String>>,
}

impl ScriptedCompiler {
    /// A compiler that fails every compilation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `module` for any source containing `marker`.
    pub fn with_output(mut self, marker: &str, module: Module) -> Self {
        self.outputs.push((marker.to_string(), module));
        self
    }

    /// Number of compilations so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Sources handed to the compiler, in order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.borrow().clone()
    }
}

impl Compiler for ScriptedCompiler {
    fn compile(&self, source: &str, _references: &ReferenceSet) -> Result<Vec<u8>, Vec<Diagnostic>> {
        self.calls.set(self.calls.get() + 1);
        self.sources.borrow_mut().push(source.to_string());
        match self.outputs.iter().find(|(marker, _)| source.contains(marker)) {
            Some((_, module)) => image::write_module(module)
                .map_err(|e| vec![Diagnostic::error("DS0001", e.to_string(), 1, 1)]),
            None => Err(vec![Diagnostic::error(
                "CS0103",
                "no scripted output matches the source",
                1,
                1,
            )]),
        }
    }
}

/// A decompiler that returns canned source per type.
#[derive(Default)]
pub struct ScriptedDecompiler {
    sources: HashMap<String, String>,
    calls: Cell<usize>,
}

impl ScriptedDecompiler {
    /// A decompiler that knows no types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `source` for `type_name`.
    pub fn with_source(mut self, type_name: &str, source: &str) -> Self {
        self.sources.insert(type_name.to_string(), source.to_string());
        self
    }

    /// Number of decompilations so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Decompiler for ScriptedDecompiler {
    fn decompile(&self, _module: &Module, type_name: &str) -> Result<String, String> {
        self.calls.set(self.calls.get() + 1);
        self.sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| format!("no source for '{type_name}'"))
    }
}
