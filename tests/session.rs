//! Patch sessions against module files on disk.

mod common;

use std::fs;

use common::{enum_members, install_game, write_line, PlayerDecompiler, ScriptedCompiler};
use dotsplice::{
    assembly::{builder::BodyBuilder, instruction::Operand, opcodes},
    image,
    metadata::{
        builders::{MethodBuilder, TypeBuilder},
        Module,
    },
    patcher::{
        FileStorage, ModuleStorage, Orchestrator, PatchConfig, PatchContext, PatchSession,
        PatchStage,
    },
    Error, Result,
};
use tempfile::TempDir;

const NPC: &str = r#"
using System;

namespace Game
{
    public class Npc
    {
        public void Greet() { Console.WriteLine("hi"); }
    }
}
"#;

const BLUE: &str = "namespace Game { public enum Color { Blue } }";

fn npc_module() -> Module {
    let mut greet = BodyBuilder::new();
    greet
        .emit_with(opcodes::LDSTR, Operand::String("hi".into()))
        .unwrap();
    greet.emit_with(opcodes::CALL, write_line()).unwrap();
    greet.emit(opcodes::RET).unwrap();

    let mut module = Module::new("Patch");
    module
        .add_type(
            "Game.Npc",
            TypeBuilder::class("Game.Npc")
                .method(MethodBuilder::new("Greet").body(greet.finish().unwrap()).build())
                .build(),
        )
        .unwrap();
    module
}

fn read(path: &std::path::Path) -> Result<Module> {
    image::read_module(&fs::read(path)?)
}

#[test]
fn patch_file_applies_requests_in_order_and_writes_once() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = FileStorage::new();
    let target = install_game(&storage, dir.path())?;

    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new().with_output("class Npc", npc_module());
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let run = orchestrator.patch_file(dir.path(), &target, &[BLUE, "", NPC])?;

    assert_eq!(run.reports.len(), 2);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].index, 1);
    assert!(matches!(run.failures[0].error, Error::InvalidFragment(_)));
    assert_eq!(run.output.as_deref(), Some(target.as_path()));

    let written = read(&target)?;
    assert!(written.contains_type("Game.Npc"));
    assert_eq!(
        enum_members(&written, "Game.Color").last(),
        Some(&("Blue".to_string(), 3))
    );
    assert!(!dir.path().join("GameTemp.dll").exists());
    Ok(())
}

#[test]
fn nothing_is_written_without_changes() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = FileStorage::new();
    let target = install_game(&storage, dir.path())?;
    let before = fs::read(&target)?;

    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let run = orchestrator.patch_file(
        dir.path(),
        &target,
        &["namespace Game { public enum Color { Red, Green } }"],
    )?;
    assert!(run.output.is_none());
    assert_eq!(fs::read(&target)?, before);
    Ok(())
}

#[test]
fn broken_modules_in_the_directory_are_recorded_not_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = FileStorage::new();
    let target = install_game(&storage, dir.path())?;
    fs::write(dir.path().join("Broken.dll"), b"MZ not a module")?;
    fs::write(dir.path().join("notes.txt"), b"ignored")?;

    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let session = PatchSession::open(
        PatchContext::new(&config, &compiler, &PlayerDecompiler, &storage),
        dir.path(),
        &target,
    )?;

    let references = session.references();
    assert_eq!(references.len(), 2);
    assert!(references.module("mscorlib").is_some());
    assert!(references.working_copy().is_some());
    assert_eq!(references.failed().len(), 1);
    assert!(references.failed()[0].0.ends_with("Broken.dll"));
    Ok(())
}

#[test]
fn later_requests_see_earlier_ones_through_the_working_copy() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = FileStorage::new();
    let target = install_game(&storage, dir.path())?;

    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new().with_output("class Npc", npc_module());
    let mut session = PatchSession::open(
        PatchContext::new(&config, &compiler, &PlayerDecompiler, &storage),
        dir.path(),
        &target,
    )?;
    let working_copy = session.working_copy().to_path_buf();
    assert!(working_copy.exists());

    session.apply(NPC)?;
    session.apply(BLUE)?;
    assert_eq!(session.stage(), PatchStage::Done);
    assert!(session.has_changes());

    let synced = image::read_module(&storage.read(&working_copy)?)?;
    assert!(synced.contains_type("Game.Npc"));
    let referenced = session.references().working_copy().unwrap();
    assert!(referenced.module.contains_type("Game.Npc"));

    let output = dir.path().join("Game.patched.dll");
    assert_eq!(session.commit(Some(&output))?, output);
    assert!(read(&output)?.contains_type("Game.Npc"));
    assert!(!working_copy.exists());
    Ok(())
}

#[test]
fn failed_request_keeps_the_session_usable() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = FileStorage::new();
    let target = install_game(&storage, dir.path())?;

    let config = PatchConfig::default().with_keep_working_copy(true);
    let compiler = ScriptedCompiler::new();
    let mut session = PatchSession::open(
        PatchContext::new(&config, &compiler, &PlayerDecompiler, &storage),
        dir.path(),
        &target,
    )?;
    let before = session.module().clone();

    assert!(session.apply(NPC).is_err());
    assert_eq!(session.stage(), PatchStage::Failed);
    assert_eq!(session.module(), &before);

    session.apply(BLUE)?;
    let working_copy = session.working_copy().to_path_buf();
    drop(session);
    assert!(working_copy.exists());
    Ok(())
}
