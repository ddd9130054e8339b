//! Generic marker-comment template expander (spec component D).
//!
//! A template is ordinary source text annotated with two kinds of markers:
//!
//!   * a **block marker**, which is the entire trailing comment on an otherwise-blank-prefixed
//!     line: `// @TAG@`. A `FOREACH_*` block is closed by a matching `// @END_FOREACH@`; an `IF_*`
//!     block is closed by `// @END_IF@`. Blocks may nest; a stack disambiguates which `END_*`
//!     closes which opener.
//!   * an **inline substitution** token, `${TAG}`, replaced by the current [`Environment`]'s
//!     binding for `TAG`.
//!
//! The expander itself has no protobuf-specific knowledge. [`Bindings`] supplies, for a given tag
//! and the environment the block was entered with, the list of per-iteration environments a
//! `FOREACH` should run its body against, or the boolean an `IF` should test. [`crate::bindings`]
//! implements it against the schema model.

use std::collections::BTreeMap;

use crate::error::BuildError;

/// The substitution bindings visible at a point in a template. Extended, never mutated in place:
/// each `FOREACH` iteration gets its own environment built by extending its parent's.
pub(crate) type Environment = BTreeMap<String, String>;

/// Schema-specific behavior for the markers a template may reference.
pub(crate) trait Bindings {
    /// Returns one environment per iteration a `FOREACH_{tag}` block should run its body against.
    fn foreach(&self, tag: &str, env: &Environment) -> Result<Vec<Environment>, BuildError>;

    /// Returns whether an `IF_{tag}` block's body should be emitted.
    fn eval_if(&self, tag: &str, env: &Environment) -> Result<bool, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Foreach,
    If,
}

enum Marker<'a> {
    Open(&'a str, BlockKind),
    Close(BlockKind),
}

/// Recognizes a block marker occupying the entirety of `line` past leading whitespace. Returns
/// `None` for any line that isn't exactly a trailing `// @TAG@` comment, including ordinary code
/// that merely ends with a `//` comment of unrelated content.
fn block_marker(line: &str) -> Option<Marker<'_>> {
    let trimmed = line.trim();
    let tag = trimmed.strip_prefix("// @")?.strip_suffix('@')?;
    match tag {
        "END_FOREACH" => Some(Marker::Close(BlockKind::Foreach)),
        "END_IF" => Some(Marker::Close(BlockKind::If)),
        _ if tag.starts_with("FOREACH_") => Some(Marker::Open(tag, BlockKind::Foreach)),
        _ if tag.starts_with("IF_") => Some(Marker::Open(tag, BlockKind::If)),
        _ => None,
    }
}

/// Scans forward from an opening marker at `start`, returning the index of its matching `END_*`
/// line. Nested blocks of either kind are skipped over via a depth-tracked stack.
fn find_block_end(template_name: &str, lines: &[&str], start: usize) -> Result<usize, BuildError> {
    let mut stack = Vec::new();
    let mut i = start;
    loop {
        if i >= lines.len() {
            let marker = match stack.last() {
                Some(BlockKind::Foreach) => "FOREACH",
                Some(BlockKind::If) | None => "IF",
            };
            return Err(BuildError::UnbalancedTemplateBlock {
                template: template_name.to_string(),
                marker: marker.to_string(),
            });
        }
        match block_marker(lines[i]) {
            Some(Marker::Open(_, kind)) => stack.push(kind),
            Some(Marker::Close(kind)) => {
                let opened = stack.pop().ok_or_else(|| BuildError::UnbalancedTemplateBlock {
                    template: template_name.to_string(),
                    marker: block_kind_name(kind).to_string(),
                })?;
                if opened != kind {
                    return Err(BuildError::UnbalancedTemplateBlock {
                        template: template_name.to_string(),
                        marker: block_kind_name(kind).to_string(),
                    });
                }
                if stack.is_empty() {
                    return Ok(i);
                }
            }
            None => {}
        }
        i += 1;
    }
}

fn block_kind_name(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Foreach => "FOREACH",
        BlockKind::If => "IF",
    }
}

/// Replaces every `${TAG}` occurrence in `line` with its binding from `env`.
fn substitute_inline(
    template_name: &str,
    line_num: usize,
    line: &str,
    env: &Environment,
) -> Result<String, BuildError> {
    let mut result = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let tag = &after[..end];
        let value = env.get(tag).ok_or_else(|| BuildError::UnknownBinding {
            template: template_name.to_string(),
            name: format!("{tag} (line {})", line_num + 1),
        })?;
        result.push_str(value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn expand_scope(
    template_name: &str,
    lines: &[&str],
    start: usize,
    end: usize,
    env: &Environment,
    bindings: &dyn Bindings,
    out: &mut String,
) -> Result<(), BuildError> {
    let mut i = start;
    while i < end {
        match block_marker(lines[i]) {
            Some(Marker::Open(tag, BlockKind::Foreach)) => {
                let block_end = find_block_end(template_name, lines, i)?;
                let iteration_tag = tag.strip_prefix("FOREACH_").unwrap_or(tag);
                for sub_env in bindings.foreach(iteration_tag, env)? {
                    expand_scope(template_name, lines, i + 1, block_end, &sub_env, bindings, out)?;
                }
                i = block_end + 1;
            }
            Some(Marker::Open(tag, BlockKind::If)) => {
                let block_end = find_block_end(template_name, lines, i)?;
                if bindings.eval_if(tag, env)? {
                    expand_scope(template_name, lines, i + 1, block_end, env, bindings, out)?;
                }
                i = block_end + 1;
            }
            Some(Marker::Close(kind)) => {
                return Err(BuildError::UnbalancedTemplateBlock {
                    template: template_name.to_string(),
                    marker: block_kind_name(kind).to_string(),
                });
            }
            None => {
                out.push_str(&substitute_inline(template_name, i, lines[i], env)?);
                out.push('\n');
                i += 1;
            }
        }
    }
    Ok(())
}

/// Expands `template` under `root_env`, dispatching every block and inline marker it contains to
/// `bindings`. Fails if any block is unbalanced or any inline token has no binding.
pub(crate) fn expand(
    template_name: &str,
    template: &str,
    root_env: &Environment,
    bindings: &dyn Bindings,
) -> Result<String, BuildError> {
    let lines: Vec<&str> = template.lines().collect();
    let mut out = String::new();
    expand_scope(template_name, &lines, 0, lines.len(), root_env, bindings, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A toy bindings implementation: `FOREACH_LETTERS` iterates a fixed alphabet, binding `LETTER`
    /// each time; `IF_EVEN` tests whether the environment's `N` binding is even.
    struct ToyBindings;

    impl Bindings for ToyBindings {
        fn foreach(&self, tag: &str, env: &Environment) -> Result<Vec<Environment>, BuildError> {
            match tag {
                "LETTERS" => Ok(["a", "b", "c"]
                    .iter()
                    .map(|letter| {
                        let mut sub = env.clone();
                        sub.insert("LETTER".to_string(), letter.to_string());
                        sub
                    })
                    .collect()),
                other => Err(BuildError::UnknownBinding {
                    template: "toy".to_string(),
                    name: other.to_string(),
                }),
            }
        }

        fn eval_if(&self, tag: &str, env: &Environment) -> Result<bool, BuildError> {
            match tag {
                "IF_EVEN" => {
                    let n: i64 = env.get("N").and_then(|v| v.parse().ok()).unwrap_or(0);
                    Ok(n % 2 == 0)
                }
                other => Err(BuildError::UnknownBinding {
                    template: "toy".to_string(),
                    name: other.to_string(),
                }),
            }
        }
    }

    #[test]
    fn expands_foreach_with_inline_substitution() {
        let template = "start\n    // @FOREACH_LETTERS@\nletter=${LETTER}\n    // @END_FOREACH@\nend";
        let out = expand("toy", template, &Environment::new(), &ToyBindings).unwrap();
        assert_eq!(out, "start\nletter=a\nletter=b\nletter=c\nend\n");
    }

    #[test]
    fn if_block_is_skipped_when_predicate_is_false() {
        let template = "    // @IF_EVEN@\nkept\n    // @END_IF@\n";
        let mut env = Environment::new();
        env.insert("N".to_string(), "3".to_string());
        let out = expand("toy", template, &env, &ToyBindings).unwrap();
        assert_eq!(out, "");

        env.insert("N".to_string(), "4".to_string());
        let out = expand("toy", template, &env, &ToyBindings).unwrap();
        assert_eq!(out, "kept\n");
    }

    #[test]
    fn nested_blocks_disambiguate_via_stack() {
        let template = "\
    // @FOREACH_LETTERS@
    // @IF_EVEN@
n=${LETTER}
    // @END_IF@
    // @END_FOREACH@
";
        let mut env = Environment::new();
        env.insert("N".to_string(), "2".to_string());
        let out = expand("toy", template, &env, &ToyBindings).unwrap();
        assert_eq!(out, "n=a\nn=b\nn=c\n");
    }

    #[test]
    fn unbalanced_block_is_rejected() {
        let template = "    // @FOREACH_LETTERS@\nx\n";
        let err = expand("toy", template, &Environment::new(), &ToyBindings).unwrap_err();
        assert!(matches!(err, BuildError::UnbalancedTemplateBlock { .. }));
    }

    #[test]
    fn mismatched_end_marker_is_rejected() {
        let template = "    // @FOREACH_LETTERS@\nx\n    // @END_IF@\n";
        let err = expand("toy", template, &Environment::new(), &ToyBindings).unwrap_err();
        assert!(matches!(err, BuildError::UnbalancedTemplateBlock { .. }));
    }

    #[test]
    fn missing_binding_is_rejected() {
        let template = "value=${MISSING}\n";
        let err = expand("toy", template, &Environment::new(), &ToyBindings).unwrap_err();
        assert!(matches!(err, BuildError::UnknownBinding { .. }));
    }

    #[test]
    fn ordinary_trailing_comments_are_not_treated_as_markers() {
        let template = "let x = 1; // not a marker\n";
        let out = expand("toy", template, &Environment::new(), &ToyBindings).unwrap();
        assert_eq!(out, template);
    }
}
