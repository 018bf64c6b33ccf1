//! Source-level merging for the method-merge path.
//!
//! The patched methods are merged into the decompiled source of their declaring type so the
//! compiler sees the complete type, not just the changed methods. The merged unit contains the
//! combined `using` directives, the decompiled namespace and the one target type.

use std::ops::Range;

use crate::{
    source::fragment::{Fragment, MethodDecl, TypeDecl},
    Error, Result,
};

/// Outcome of [`merge_methods`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedSource {
    /// The compilation unit to hand to the compiler
    pub source: String,
    /// `Type::Method` names whose decompiled declaration was replaced
    pub replaced: Vec<String>,
    /// `Type::Method` names that were not in the decompiled type and were appended to it
    pub appended: Vec<String>,
    /// Nested types of the fragment with no decompiled counterpart, left out of the merge
    pub missing_types: Vec<String>,
}

/// Combine two lists of `using` directives, dropping duplicates and sorting by text.
#[must_use]
pub fn merge_usings(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = first
        .iter()
        .chain(second)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    merged.sort();
    merged.dedup();
    merged
}

/// Build a compilation unit from usings, an optional namespace and a single type declaration.
#[must_use]
pub fn compose_type_unit(usings: &[String], namespace: &str, type_text: &str) -> String {
    let mut unit = String::new();
    for using in usings {
        unit.push_str(using);
        unit.push('\n');
    }
    if !usings.is_empty() {
        unit.push('\n');
    }
    if namespace.is_empty() {
        unit.push_str(type_text);
        unit.push('\n');
    } else {
        unit.push_str("namespace ");
        unit.push_str(namespace);
        unit.push_str("\n{\n");
        unit.push_str(type_text);
        unit.push_str("\n}\n");
    }
    unit
}

/// Merge the methods `fragment` declares for `type_name` into the decompiled source of that type.
///
/// `type_name` must name a top-level type. Methods of nested types are merged into the
/// matching nested declarations.
///
/// # Errors
///
/// Returns [`Error::TypeNotFound`] if the decompiled source does not declare `type_name` and
/// [`Error::InvalidFragment`] if the fragment does not.
pub fn merge_methods(decompiled: &Fragment, fragment: &Fragment, type_name: &str) -> Result<MergedSource> {
    let target = decompiled
        .find_type(type_name)
        .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;
    let patch = fragment
        .find_type(type_name)
        .ok_or_else(|| Error::InvalidFragment(format!("fragment does not declare '{type_name}'")))?;

    let mut merged = MergedSource::default();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();

    for patch_decl in patch.walk() {
        let suffix = &patch_decl.full_name[patch.full_name.len()..];
        let Some(target_decl) = target.find(&format!("{}{suffix}", target.full_name)) else {
            merged.missing_types.push(patch_decl.full_name.clone());
            continue;
        };

        let mut taken: Vec<usize> = Vec::new();
        for method in &patch_decl.methods {
            let label = format!("{}::{}", target_decl.full_name, method.name);
            match counterpart(target_decl, patch_decl, method, &taken) {
                Some(index) => {
                    taken.push(index);
                    let original = &target_decl.methods[index];
                    let tail = &fragment.source[method.header_start..method.span.end];
                    let text = match &original.attributes {
                        Some(attributes) => format!("{}\n{tail}", decompiled.text(attributes)),
                        None => tail.to_string(),
                    };
                    edits.push((original.span.clone(), text));
                    merged.replaced.push(label);
                }
                None => {
                    let at = target_decl.body.end;
                    edits.push((at..at, format!("\n{}\n", fragment.text(&method.span))));
                    merged.appended.push(label);
                }
            }
        }
    }

    let base = target.span.start;
    let mut type_text = decompiled.text(&target.span).to_string();
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start).then(b.0.end.cmp(&a.0.end)));
    for (range, text) in edits {
        type_text.replace_range(range.start - base..range.end - base, &text);
    }

    let usings = merge_usings(&decompiled.usings, &fragment.usings);
    merged.source = compose_type_unit(&usings, decompiled.namespace_name(), &type_text);
    Ok(merged)
}

/// Index of the decompiled method that `method` replaces.
///
/// Matches by name, by name and parameter count when the fragment overloads the name, and
/// prefers a same-arity declaration otherwise. Each decompiled method is replaced at most once.
fn counterpart(
    target: &TypeDecl,
    patch: &TypeDecl,
    method: &MethodDecl,
    taken: &[usize],
) -> Option<usize> {
    let candidates = || {
        target
            .methods
            .iter()
            .enumerate()
            .filter(|(i, m)| m.name == method.name && !taken.contains(i))
    };
    let same_arity = candidates()
        .find(|(_, m)| m.param_count == method.param_count)
        .map(|(i, _)| i);
    if patch.is_overloaded(&method.name) {
        same_arity
    } else {
        same_arity.or_else(|| candidates().next().map(|(i, _)| i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECOMPILED: &str = r#"using System;
using UnityEngine;

namespace Game
{
	public class Player : MonoBehaviour
	{
		private int health;

		[Obsolete("use Heal")]
		public void Heal(int amount)
		{
			health += amount;
		}

		public void Tick()
		{
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

    const PATCH: &str = r#"using System.Linq;
using System;

namespace Game
{
    public class Player
    {
        public void Heal(int amount)
        {
            health += amount * 2;
        }

        public void Dance() { Heal(1); }

        public class Stats
        {
            public void Reset() { Console.WriteLine("reset"); }
        }

        public class Ghost
        {
            public void Boo() { }
        }
    }
}
"#;

    #[test]
    fn replaces_appends_and_keeps_attributes() {
        let decompiled = Fragment::parse(DECOMPILED).unwrap();
        let fragment = Fragment::parse(PATCH).unwrap();
        let merged = merge_methods(&decompiled, &fragment, "Game.Player").unwrap();

        assert_eq!(
            merged.replaced,
            vec!["Game.Player::Heal", "Game.Player/Stats::Reset"]
        );
        assert_eq!(merged.appended, vec!["Game.Player::Dance"]);
        assert_eq!(merged.missing_types, vec!["Game.Player/Ghost"]);

        let unit = Fragment::parse(&merged.source).unwrap();
        assert_eq!(
            unit.usings,
            vec!["using System.Linq;", "using System;", "using UnityEngine;"]
        );
        let player = unit.find_type("Game.Player").unwrap();
        let names: Vec<_> = player.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Heal", "Tick", "Dance"]);

        let heal = player.method("Heal").unwrap();
        assert!(unit.text(&heal.span).contains("amount * 2"));
        assert!(unit
            .text(heal.attributes.as_ref().unwrap())
            .contains("Obsolete"));
        assert!(merged.source.contains("Console.WriteLine(\"reset\")"));
        assert!(merged.source.contains("private int health;"));
    }

    #[test]
    fn overloads_match_by_arity() {
        let decompiled = Fragment::parse(
            "class C { void Log(int a) { } void Log(int a, int b) { } void Log() { } }",
        )
        .unwrap();
        let fragment =
            Fragment::parse("class C { void Log(int a, int b) { new2(); } void Log(string s, int x, int y) { } }")
                .unwrap();
        let merged = merge_methods(&decompiled, &fragment, "C").unwrap();
        assert_eq!(merged.replaced, vec!["C::Log"]);
        assert_eq!(merged.appended, vec!["C::Log"]);

        let unit = Fragment::parse(&merged.source).unwrap();
        let arities: Vec<_> = unit.types[0].methods.iter().map(|m| m.param_count).collect();
        assert_eq!(arities, vec![1, 2, 0, 3]);
        assert!(unit.text(&unit.types[0].methods[1].span).contains("new2"));
    }

    #[test]
    fn missing_types_are_errors() {
        let decompiled = Fragment::parse("class C { }").unwrap();
        let fragment = Fragment::parse("class D { void M() { } }").unwrap();
        assert!(matches!(
            merge_methods(&decompiled, &fragment, "D"),
            Err(Error::TypeNotFound(_))
        ));
        assert!(matches!(
            merge_methods(&decompiled, &fragment, "C"),
            Err(Error::InvalidFragment(_))
        ));
    }

    #[test]
    fn usings_are_deduplicated() {
        let merged = merge_usings(
            &["using B;".into(), " using A; ".into()],
            &["using A;".into()],
        );
        assert_eq!(merged, vec!["using A;", "using B;"]);
    }

    #[test]
    fn compose_wraps_namespace() {
        let unit = compose_type_unit(&["using System;".into()], "Game", "enum Mood { Calm }");
        assert_eq!(
            unit,
            "using System;\n\nnamespace Game\n{\nenum Mood { Calm }\n}\n"
        );
        assert_eq!(compose_type_unit(&[], "", "class C { }"), "class C { }\n");
    }
}
