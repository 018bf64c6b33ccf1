//! Method merges that splice new bodies into existing methods.

mod common;

use common::{
    call_on_player, corlib_references, game_module, player_type, PlayerDecompiler,
    ScriptedCompiler,
};
use dotsplice::{
    assembly::{
        builder::BodyBuilder,
        flow::FlowGraph,
        instruction::{Immediate, InstrId, Operand},
        opcodes,
    },
    image,
    metadata::{
        body::MethodBody,
        signatures::{TypeRef, TypeSig},
        Module,
    },
    patcher::{validate_module, ChangeKind, MemoryStorage, Orchestrator, PatchConfig, PatchContext},
    Result,
};

const TICK_PATCH: &str = r#"
using System;

namespace Game
{
    public class Player
    {
        public void Tick()
        {
            int pending = 3;
            try
            {
                if (pending == 0) { }
                Log();
            }
            catch (Exception)
            {
                Log("failed");
            }
        }
    }
}
"#;

/// `Tick` as the compiler emits it for [`TICK_PATCH`].
fn guarded_tick() -> MethodBody {
    let mut b = BodyBuilder::new();
    let pending = b.local(TypeSig::I4);
    b.emit_with(opcodes::LDC_I4_S, Operand::Immediate(Immediate::Int8(3)))
        .unwrap();
    b.emit_with(opcodes::STLOC_S, Operand::Local(pending)).unwrap();
    b.define_label("try").unwrap();
    b.emit_with(opcodes::LDLOC_S, Operand::Local(pending)).unwrap();
    b.emit_branch(opcodes::BRTRUE_S, "skip").unwrap();
    b.emit(opcodes::NOP).unwrap();
    b.define_label("skip").unwrap();
    b.emit(opcodes::LDARG_0).unwrap();
    b.emit_with(opcodes::CALL, call_on_player("Log", vec![])).unwrap();
    b.emit_branch(opcodes::LEAVE_S, "done").unwrap();
    b.define_label("handler").unwrap();
    b.emit(opcodes::POP).unwrap();
    b.emit(opcodes::LDARG_0).unwrap();
    b.emit_with(opcodes::LDSTR, Operand::String("failed".into()))
        .unwrap();
    b.emit_with(opcodes::CALL, call_on_player("Log", vec![TypeSig::String]))
        .unwrap();
    b.emit_branch(opcodes::LEAVE_S, "done").unwrap();
    b.define_label("done").unwrap();
    b.emit(opcodes::RET).unwrap();
    b.catch_handler(
        "try",
        "handler",
        "handler",
        "done",
        TypeSig::Class(TypeRef::external("mscorlib", "System", "Exception")),
    );
    b.finish().unwrap()
}

/// The compiled merge result: the decompiled `Game.Player` with the new `Tick`.
fn compiled_player() -> Module {
    let mut player = player_type();
    let tick = player.find_method("Tick", 0).unwrap();
    player.methods[tick].body = Some(guarded_tick());

    let mut module = Module::new("Patch");
    module.add_type("Game.Player", player).unwrap();
    module
}

fn tick_body(module: &Module) -> &MethodBody {
    let player = module.find_type("Game.Player").unwrap();
    let tick = player.find_method("Tick", 0).unwrap();
    player.methods[tick].body.as_ref().unwrap()
}

fn patched() -> Result<(Module, Module)> {
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new().with_output("class Player", compiled_player());
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let original = game_module();
    let mut module = original.clone();
    let report = orchestrator.patch_module(&mut module, &corlib_references(), TICK_PATCH)?;
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].kind, ChangeKind::SplicedMethod);
    assert_eq!(report.applied[0].symbol, "Game.Player::Tick");
    assert_eq!(compiler.calls(), 1);
    Ok((original, module))
}

#[test]
fn forward_branches_and_regions_survive_the_splice() -> Result<()> {
    let (_, module) = patched()?;
    let body = tick_body(&module);

    assert_eq!(body.instructions.len(), 14);
    assert_eq!(body.locals.len(), 1);
    assert_eq!(body.instructions[1].operand, Operand::Local(0));
    assert_eq!(body.instructions[3].operand, Operand::Target(InstrId(5)));
    assert_eq!(body.instructions[7].operand, Operand::Target(InstrId(13)));

    let region = &body.exception_handlers[0];
    assert_eq!(region.try_start, InstrId(2));
    assert_eq!(region.try_end, InstrId(8));
    assert_eq!(region.handler_start, InstrId(8));
    assert_eq!(region.handler_end, Some(InstrId(13)));
    assert!(region.try_start < region.try_end);
    assert!(region.try_end <= region.handler_start);
    assert!(region.is_ordered(body.instructions.len()));

    let fresh = guarded_tick();
    assert_eq!(
        FlowGraph::build(body)?.shape(),
        FlowGraph::build(&fresh)?.shape()
    );
    Ok(())
}

#[test]
fn calls_bind_to_the_existing_overloads() -> Result<()> {
    let (_, module) = patched()?;
    let body = tick_body(&module);

    for (index, params) in [(6, 0), (11, 1)] {
        let Operand::Method(call) = &body.instructions[index].operand else {
            panic!("instruction {index} is not a call");
        };
        assert_eq!(call.name, "Log");
        assert_eq!(call.param_count(), params);
        let owner = call.declaring_type().unwrap();
        assert!(owner.is_local());
        assert_eq!(owner.full_name(), "Game.Player");
    }
    validate_module(&module, &corlib_references())
}

#[test]
fn only_the_spliced_body_changes() -> Result<()> {
    let (original, mut module) = patched()?;

    let player = module.find_type_mut("Game.Player").unwrap();
    let tick = player.find_method("Tick", 0).unwrap();
    player.methods[tick].body = Some(tick_body(&original).clone());

    assert_eq!(module, original);
    Ok(())
}

#[test]
fn spliced_module_survives_the_image() -> Result<()> {
    let (_, module) = patched()?;
    let decoded = image::read_module(&image::write_module(&module)?)?;
    assert_eq!(decoded, module);
    Ok(())
}
