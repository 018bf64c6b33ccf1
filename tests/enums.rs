//! Additive enum updates through the orchestrator.

mod common;

use common::{corlib_references, enum_members, game_module, PlayerDecompiler, ScriptedCompiler};
use dotsplice::{
    patcher::{ChangeKind, MemoryStorage, Orchestrator, PatchConfig, PatchContext},
    Result,
};

const COLOR_PATCH: &str = r#"
namespace Game
{
    public enum Color
    {
        Red,
        Green,
        Blue,
        Violet = 10
    }
}
"#;

#[test]
fn implicit_values_continue_after_the_largest_member() -> Result<()> {
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let mut module = game_module();
    let report = orchestrator.patch_module(&mut module, &corlib_references(), COLOR_PATCH)?;

    assert_eq!(
        enum_members(&module, "Game.Color"),
        vec![
            ("Red".to_string(), 0),
            ("Green".to_string(), 2),
            ("Blue".to_string(), 3),
            ("Violet".to_string(), 10),
        ]
    );
    assert_eq!(report.applied.len(), 2);
    assert!(report
        .applied
        .iter()
        .all(|change| change.kind == ChangeKind::UpdatedEnum));
    assert_eq!(compiler.calls(), 0, "enum updates are applied without compiling");
    Ok(())
}

#[test]
fn applying_an_enum_patch_twice_changes_nothing_the_second_time() -> Result<()> {
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));
    let references = corlib_references();

    let mut module = game_module();
    orchestrator.patch_module(&mut module, &references, COLOR_PATCH)?;
    let once = module.clone();

    let report = orchestrator.patch_module(&mut module, &references, COLOR_PATCH)?;
    assert!(!report.changed());
    assert_eq!(module, once);
    Ok(())
}

#[test]
fn enum_fragment_for_a_class_is_reported_and_ignored() -> Result<()> {
    let config = PatchConfig::default();
    let compiler = ScriptedCompiler::new();
    let storage = MemoryStorage::new();
    let orchestrator = Orchestrator::new(PatchContext::new(
        &config,
        &compiler,
        &PlayerDecompiler,
        &storage,
    ));

    let mut module = game_module();
    let before = module.clone();
    let report = orchestrator.patch_module(
        &mut module,
        &corlib_references(),
        "namespace Game { public enum Player { Idle } }",
    )?;

    assert!(!report.changed());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(module, before);
    Ok(())
}
