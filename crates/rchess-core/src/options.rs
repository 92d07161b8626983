//! Typed, validated, change-notifying runtime options.
//!
//! Names are case-insensitive and unique; iteration for protocol display
//! follows insertion order, tracked by a per-registry counter. Assignment
//! validates against the option's kind and silently rejects bad input: the
//! previous value stays and no callback fires.

use std::fmt;
use std::sync::Arc;

use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptKind {
    Button,
    Check,
    Spin,
    String,
    Combo,
}

impl OptKind {
    fn as_str(self) -> &'static str {
        match self {
            OptKind::Button => "button",
            OptKind::Check => "check",
            OptKind::Spin => "spin",
            OptKind::String => "string",
            OptKind::Combo => "combo",
        }
    }
}

/// Committed value snapshot handed to change callbacks.
#[derive(Debug, Clone)]
pub struct OptValue {
    pub name: String,
    kind: OptKind,
    value: String,
}

impl OptValue {
    pub fn int(&self) -> i64 {
        debug_assert!(matches!(self.kind, OptKind::Spin | OptKind::Check));
        if self.kind == OptKind::Check {
            return (self.value == "true") as i64;
        }
        self.value.parse().unwrap_or(0)
    }

    pub fn boolean(&self) -> bool {
        debug_assert_eq!(self.kind, OptKind::Check);
        self.value == "true"
    }

    pub fn string(&self) -> &str {
        &self.value
    }
}

/// Change callback, run by [`Engine::set_option`] with the whole engine
/// context mutably borrowed.
pub type OnChange = Arc<dyn Fn(&mut Engine, &OptValue) + Send + Sync>;

pub struct Opt {
    name: String,
    kind: OptKind,
    default: String,
    current: String,
    min: i64,
    max: i64,
    idx: usize,
    on_change: Option<OnChange>,
}

impl Opt {
    pub fn button() -> Opt {
        Opt::raw(OptKind::Button, String::new(), 0, 0)
    }

    pub fn check(default: bool) -> Opt {
        let v = if default { "true" } else { "false" };
        Opt::raw(OptKind::Check, v.to_string(), 0, 0)
    }

    pub fn spin(default: i64, min: i64, max: i64) -> Opt {
        Opt::raw(OptKind::Spin, default.to_string(), min, max)
    }

    pub fn string_opt(default: &str) -> Opt {
        Opt::raw(OptKind::String, default.to_string(), 0, 0)
    }

    /// `default` carries the alternatives in the protocol's notation, e.g.
    /// `"Both var Off var White var Black var Both"`; `current` is the
    /// initially selected token.
    pub fn combo(default: &str, current: &str) -> Opt {
        let mut o = Opt::raw(OptKind::Combo, default.to_string(), 0, 0);
        o.current = current.to_string();
        o
    }

    pub fn on_change(mut self, f: OnChange) -> Opt {
        self.on_change = Some(f);
        self
    }

    fn raw(kind: OptKind, default: String, min: i64, max: i64) -> Opt {
        Opt {
            name: String::new(),
            kind,
            current: default.clone(),
            default,
            min,
            max,
            idx: 0,
            on_change: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> OptKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric view of a spin or check option.
    pub fn int(&self) -> i64 {
        debug_assert!(matches!(self.kind, OptKind::Spin | OptKind::Check));
        if self.kind == OptKind::Check {
            return (self.current == "true") as i64;
        }
        self.current.parse().unwrap_or(0)
    }

    pub fn boolean(&self) -> bool {
        debug_assert_eq!(self.kind, OptKind::Check);
        self.current == "true"
    }

    pub fn string(&self) -> &str {
        &self.current
    }

    /// Validity predicate for `value` under this option's kind. Combo
    /// alternatives come from the space-separated default string, matched
    /// case-insensitively; the `var` separator itself is never a value.
    fn accepts(&self, value: &str) -> bool {
        match self.kind {
            OptKind::Button => true,
            OptKind::String => true,
            OptKind::Check => value == "true" || value == "false",
            OptKind::Spin => value
                .parse::<i64>()
                .is_ok_and(|v| v >= self.min && v <= self.max),
            OptKind::Combo => {
                !value.eq_ignore_ascii_case("var")
                    && self
                        .default
                        .split_whitespace()
                        .any(|tok| tok.eq_ignore_ascii_case(value))
            }
        }
    }

    fn snapshot(&self) -> OptValue {
        OptValue {
            name: self.name.clone(),
            kind: self.kind,
            value: self.current.clone(),
        }
    }
}

/// The registry: insertion-ordered, case-insensitive option table.
pub struct OptionMap {
    opts: Vec<Opt>,
    insert_order: usize,
}

impl OptionMap {
    pub fn new() -> OptionMap {
        OptionMap {
            opts: Vec::new(),
            insert_order: 0,
        }
    }

    /// Registers `opt` under `name`, replacing any existing option of the
    /// same (case-insensitive) name. The option takes the next insertion
    /// index either way.
    pub fn add(&mut self, name: &str, mut opt: Opt) {
        opt.name = name.to_string();
        opt.idx = self.insert_order;
        self.insert_order += 1;
        match self.position(name) {
            Some(i) => self.opts[i] = opt,
            None => self.opts.push(opt),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Opt> {
        self.position(name).map(|i| &self.opts[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.opts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opts.is_empty()
    }

    /// Validates and commits an assignment. Returns `None` when the name is
    /// unknown or the value fails the kind's validity predicate; the
    /// option is then left untouched. On success returns the committed
    /// snapshot and the callback the caller must invoke (see
    /// [`Engine::set_option`]).
    pub fn commit(&mut self, name: &str, value: &str) -> Option<(OptValue, Option<OnChange>)> {
        let i = self.position(name)?;
        let opt = &mut self.opts[i];
        if !opt.accepts(value) {
            return None;
        }
        if opt.kind != OptKind::Button {
            opt.current = value.to_string();
        }
        Some((opt.snapshot(), opt.on_change.clone()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.opts
            .iter()
            .position(|o| o.name.eq_ignore_ascii_case(name))
    }
}

impl Default for OptionMap {
    fn default() -> Self {
        OptionMap::new()
    }
}

/// Protocol advertisement: every option in ascending insertion-index
/// order, regardless of internal storage order.
impl fmt::Display for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ordered: Vec<&Opt> = self.opts.iter().collect();
        ordered.sort_by_key(|o| o.idx);
        for o in ordered {
            write!(f, "option name {} type {}", o.name, o.kind.as_str())?;
            match o.kind {
                OptKind::Button => {}
                OptKind::Spin => {
                    write!(f, " default {} min {} max {}", o.default, o.min, o.max)?
                }
                _ => write!(f, " default {}", o.default)?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
