//! Method merges that add methods, and whole new types.

mod common;

use common::{
    call_on_player, corlib_references, game_module, player_type, ret_body, write_line,
    PlayerDecompiler, ScriptedCompiler,
};
use dotsplice::{
    assembly::{builder::BodyBuilder, instruction::Operand, opcodes},
    metadata::{
        body::MethodBody,
        builders::{MethodBuilder, TypeBuilder},
        members::MethodRef,
        signatures::{MethodSig, TypeRef, TypeSig},
        typedef::TypeDef,
        Module,
    },
    patcher::{
        validate_module, ChangeKind, MemoryStorage, Orchestrator, PatchConfig, PatchContext,
        PatchReport,
    },
    Error, Result,
};

fn calling(target: Operand) -> MethodBody {
    let mut b = BodyBuilder::new();
    b.emit(opcodes::LDARG_0).unwrap();
    b.emit_with(opcodes::CALL, target).unwrap();
    b.emit(opcodes::RET).unwrap();
    b.finish().unwrap()
}

fn printing() -> MethodBody {
    let mut b = BodyBuilder::new();
    b.emit_with(opcodes::LDSTR, Operand::String("util".into()))
        .unwrap();
    b.emit_with(opcodes::CALL, write_line()).unwrap();
    b.emit(opcodes::RET).unwrap();
    b.finish().unwrap()
}

fn compiled(ty: TypeDef, full_name: &str) -> Module {
    let mut module = Module::new("Patch");
    module.add_type(full_name, ty).unwrap();
    module
}

fn patch(module: &mut Module, compiled: Module, fragment: &str) -> Result<PatchReport> {
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new().with_output("class ", compiled);
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));
    orchestrator.patch_module(module, &corlib_references(), fragment)
}

fn methods_named(ty: &TypeDef, name: &str) -> usize {
    ty.methods.iter().filter(|m| m.name == name).count()
}

fn first_call(ty: &TypeDef, method: &str) -> MethodRef {
    let index = ty.find_method_by_name(method).unwrap();
    let body = ty.methods[index].body.as_ref().unwrap();
    body.instructions
        .iter()
        .find_map(|i| match &i.operand {
            Operand::Method(m) => Some(m.clone()),
            _ => None,
        })
        .unwrap()
}

#[test]
fn spliced_method_binds_to_the_added_sibling() -> Result<()> {
    let fragment = r#"
namespace Game
{
    public class Player
    {
        public void Tick() { Util(); }
        private void Util() { Console.WriteLine("util"); }
    }
}
"#;
    let mut fresh = player_type();
    let tick = fresh.find_method("Tick", 0).unwrap();
    fresh.methods[tick].body = Some(calling(call_on_player("Util", vec![])));
    fresh.methods.push(MethodBuilder::new("Util").body(printing()).build());

    let mut module = game_module();
    let report = patch(&mut module, compiled(fresh, "Game.Player"), fragment)?;

    let kinds: Vec<_> = report.applied.iter().map(|c| (c.kind, c.symbol.as_str())).collect();
    assert_eq!(
        kinds,
        vec![
            (ChangeKind::SplicedMethod, "Game.Player::Tick"),
            (ChangeKind::AddedMethod, "Game.Player::Util"),
        ]
    );

    let player = module.find_type("Game.Player").unwrap();
    assert_eq!(methods_named(player, "Util"), 1);
    let call = first_call(player, "Tick");
    assert_eq!(call.name, "Util");
    assert!(call.declaring_type().unwrap().is_local());
    assert_eq!(call.declaring_type().unwrap().full_name(), "Game.Player");
    validate_module(&module, &corlib_references())
}

#[test]
fn new_methods_calling_each_other_bind_to_single_definitions() -> Result<()> {
    let fragment = r#"
namespace Game
{
    public class Player
    {
        public void Helper() { Util(); }
        public void Util() { }
    }
}
"#;
    let mut fresh = player_type();
    fresh.methods.push(
        MethodBuilder::new("Helper")
            .body(calling(call_on_player("Util", vec![])))
            .build(),
    );
    fresh.methods.push(MethodBuilder::new("Util").body(ret_body()).build());

    let mut module = game_module();
    let report = patch(&mut module, compiled(fresh, "Game.Player"), fragment)?;
    assert_eq!(report.applied.len(), 2);

    let player = module.find_type("Game.Player").unwrap();
    assert_eq!(methods_named(player, "Helper"), 1);
    assert_eq!(methods_named(player, "Util"), 1);
    assert_eq!(first_call(player, "Helper").declaring_type().unwrap().full_name(), "Game.Player");
    validate_module(&module, &corlib_references())
}

#[test]
fn missing_nested_counterpart_skips_only_that_group() -> Result<()> {
    let fragment = r#"
namespace Game
{
    public class Player
    {
        public void Tick() { Log(); }

        public class Stats
        {
            public void Reset() { }
        }
    }
}
"#;
    let mut fresh = player_type();
    let tick = fresh.find_method("Tick", 0).unwrap();
    fresh.methods[tick].body = Some(calling(call_on_player("Log", vec![])));
    fresh.nested_types.clear();

    let original = game_module();
    let mut module = original.clone();
    let report = patch(&mut module, compiled(fresh, "Game.Player"), fragment)?;

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].symbol, "Game.Player::Tick");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("Game.Player/Stats"));

    assert_eq!(
        module.find_type("Game.Player/Stats"),
        original.find_type("Game.Player/Stats")
    );
    assert_ne!(module, original);
    validate_module(&module, &corlib_references())
}

#[test]
fn unresolved_call_in_a_later_group_rolls_back_the_request() {
    let fragment = r#"
namespace Game
{
    public class Player
    {
        public void Tick() { Log(); }

        public class Stats
        {
            public void Reset() { Dance(); }
        }
    }
}
"#;
    let dance = Operand::Method(MethodRef::new(
        TypeSig::Class(TypeRef::local("Game", "Player")),
        "Dance",
        MethodSig::new_static(TypeSig::Void, vec![]),
    ));
    let mut fresh = player_type();
    let tick = fresh.find_method("Tick", 0).unwrap();
    fresh.methods[tick].body = Some(calling(call_on_player("Log", vec![])));
    fresh.nested_types[0].methods[0].body = Some(calling(dance));

    let original = game_module();
    let mut module = original.clone();
    let result = patch(&mut module, compiled(fresh, "Game.Player"), fragment);

    assert!(matches!(result, Err(Error::UnresolvedReference { .. })));
    assert_eq!(module, original);
}

#[test]
fn whole_new_type_is_cloned_with_its_internal_calls() -> Result<()> {
    let fragment = r#"
using System;

namespace Game
{
    public class Npc
    {
        public void Greet() { Util(); }
        private void Util() { Console.WriteLine("util"); }
    }
}
"#;
    let util = Operand::Method(MethodRef::new(
        TypeSig::Class(TypeRef::local("Game", "Npc")),
        "Util",
        MethodSig::new_instance(TypeSig::Void, vec![]),
    ));
    let npc = TypeBuilder::class("Game.Npc")
        .method(MethodBuilder::new("Greet").body(calling(util)).build())
        .method(MethodBuilder::new("Util").body(printing()).build())
        .build();

    let mut module = game_module();
    let report = patch(&mut module, compiled(npc, "Game.Npc"), fragment)?;

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].kind, ChangeKind::AddedType);
    let npc = module.find_type("Game.Npc").unwrap();
    assert_eq!(methods_named(npc, "Util"), 1);
    assert!(!npc.token.is_null());
    let call = first_call(npc, "Greet");
    assert!(call.declaring_type().unwrap().is_local());
    assert_eq!(call.declaring_type().unwrap().full_name(), "Game.Npc");
    validate_module(&module, &corlib_references())
}

#[test]
fn compile_errors_leave_the_module_untouched() {
    let mut module = game_module();
    let original = module.clone();
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let result = orchestrator.patch_module(
        &mut module,
        &corlib_references(),
        "namespace Game { public class Player { public void Tick() { Jump(); } } }",
    );
    match result {
        Err(Error::Compilation {
            type_name,
            diagnostics,
        }) => {
            assert_eq!(type_name, "Game.Player");
            assert_eq!(diagnostics.len(), 1);
        }
        other => panic!("expected a compilation error, got {other:?}"),
    }
    assert_eq!(module, original);
}
