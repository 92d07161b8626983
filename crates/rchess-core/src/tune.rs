//! Tuning registry: binds internal numeric parameters to options for
//! offline parameter search.
//!
//! Scalar entries expose one spin option each; paired middlegame/endgame
//! entries decompose into two options with `m`/`e` name prefixes that write
//! back into the shared packed value. Entries declared as a group can defer
//! their post-update side effect until the last option of the group
//! changes.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::engine::Engine;
use crate::options::{OnChange, Opt, OptionMap};
use crate::types::{eg_value, make_score, mg_value, Score};

/// Range of the generated option as a function of the parameter's current
/// value.
#[derive(Clone, Copy)]
pub enum SetRange {
    /// Computed from the value.
    Fn(fn(i32) -> (i32, i32)),
    /// Fixed bounds.
    Minmax(i32, i32),
}

impl SetRange {
    fn apply(self, v: i32) -> (i32, i32) {
        match self {
            SetRange::Fn(f) => f(v),
            SetRange::Minmax(min, max) => (min, max),
        }
    }
}

pub fn default_range(v: i32) -> (i32, i32) {
    if v > 0 {
        (0, 2 * v)
    } else {
        (2 * v, 0)
    }
}

/// A live scalar parameter, shared between the tuning registry and the code
/// that consumes it.
#[derive(Clone)]
pub struct TunedValue(Arc<AtomicI32>);

impl TunedValue {
    pub fn new(v: i32) -> TunedValue {
        TunedValue(Arc::new(AtomicI32::new(v)))
    }

    #[inline]
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, v: i32) {
        self.0.store(v, Ordering::Relaxed);
    }
}

/// A live paired middlegame/endgame parameter, packed as a [`Score`].
#[derive(Clone)]
pub struct TunedScore(Arc<AtomicI32>);

impl TunedScore {
    pub fn new(mg: i32, eg: i32) -> TunedScore {
        TunedScore(Arc::new(AtomicI32::new(make_score(mg, eg).0)))
    }

    #[inline]
    pub fn get(&self) -> Score {
        Score(self.0.load(Ordering::Relaxed))
    }

    pub fn mg(&self) -> i32 {
        mg_value(self.get())
    }

    pub fn eg(&self) -> i32 {
        eg_value(self.get())
    }

    fn set_mg(&self, mg: i32) {
        self.0
            .store(make_score(mg, eg_value(self.get())).0, Ordering::Relaxed);
    }

    fn set_eg(&self, eg: i32) {
        self.0
            .store(make_score(mg_value(self.get()), eg).0, Ordering::Relaxed);
    }
}

/// One binding handed to [`Tune::add`], consumed in declaration order
/// against the parsed name list.
pub enum TuneBinding {
    Value(TunedValue, SetRange),
    Score(TunedScore, SetRange),
    /// No option of its own; runs whenever the registry reads options back.
    PostUpdate(Arc<dyn Fn() + Send + Sync>),
}

enum Entry {
    Value {
        name: String,
        value: TunedValue,
        range: SetRange,
    },
    Score {
        name: String,
        value: TunedScore,
        range: SetRange,
    },
    PostUpdate(Arc<dyn Fn() + Send + Sync>),
}

pub struct Tune {
    entries: Vec<Entry>,
    /// When set, intermediate changes inside a declared group do not
    /// re-read; only a change of the last declared option does.
    pub update_on_last: bool,
    last_option: Option<String>,
}

impl Tune {
    pub fn new() -> Tune {
        Tune {
            entries: Vec::new(),
            update_on_last: false,
            last_option: None,
        }
    }

    /// Pops the next parameter name off a comma-separated specification.
    /// A name is complete only once parenthesis nesting returns to zero, so
    /// commas inside a parenthesized group do not split it. With `pop`
    /// false the specification is left untouched.
    pub fn next(names: &mut String, pop: bool) -> String {
        let mut name = String::new();
        let mut rest = names.as_str();
        loop {
            let (token, tail) = match rest.find(',') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, ""),
            };
            rest = tail;
            if !name.is_empty() {
                name.push_str(", ");
            }
            name.push_str(token.trim());
            if name.matches('(').count() == name.matches(')').count() {
                break;
            }
        }
        if pop {
            let consumed = rest.to_string();
            *names = consumed;
        }
        name
    }

    /// Registers a group of parameters. `names` is the comma-separated name
    /// specification; bindings are paired with the parsed names in order.
    pub fn add(&mut self, names: &str, bindings: Vec<TuneBinding>) {
        let mut names = names.to_string();
        for binding in bindings {
            match binding {
                TuneBinding::Value(value, range) => {
                    let name = Self::next(&mut names, true);
                    self.entries.push(Entry::Value { name, value, range });
                }
                TuneBinding::Score(value, range) => {
                    let name = Self::next(&mut names, true);
                    self.entries.push(Entry::Score { name, value, range });
                }
                TuneBinding::PostUpdate(f) => {
                    let _ = Self::next(&mut names, true);
                    self.entries.push(Entry::PostUpdate(f));
                }
            }
        }
    }

    /// Materializes the options for every registered entry and remembers
    /// the last one declared, the anchor for `update_on_last` groups.
    pub fn init(&mut self, options: &mut OptionMap) {
        let mut last = self.last_option.take();
        for entry in &self.entries {
            match entry {
                Entry::Value { name, value, range } => {
                    if let Some(n) = make_option(options, name, value.get(), *range) {
                        last = Some(n);
                    }
                }
                Entry::Score { name, value, range } => {
                    if let Some(n) = make_option(options, &format!("m{name}"), value.mg(), *range)
                    {
                        last = Some(n);
                    }
                    if let Some(n) = make_option(options, &format!("e{name}"), value.eg(), *range)
                    {
                        last = Some(n);
                    }
                }
                Entry::PostUpdate(_) => {}
            }
        }
        self.last_option = last;
    }

    /// True when `name` is the last option this registry declared.
    pub fn is_last(&self, name: &str) -> bool {
        self.last_option
            .as_deref()
            .is_some_and(|last| last.eq_ignore_ascii_case(name))
    }

    /// Reads every bound parameter back from its option and runs the
    /// post-update hooks.
    pub fn read_options(&self, options: &OptionMap) {
        for entry in &self.entries {
            match entry {
                Entry::Value { name, value, .. } => {
                    if let Some(o) = options.get(name) {
                        value.set(o.int() as i32);
                    }
                }
                Entry::Score { name, value, .. } => {
                    if let Some(o) = options.get(&format!("m{name}")) {
                        value.set_mg(o.int() as i32);
                    }
                    if let Some(o) = options.get(&format!("e{name}")) {
                        value.set_eg(o.int() as i32);
                    }
                }
                Entry::PostUpdate(f) => (**f)(),
            }
        }
    }
}

impl Default for Tune {
    fn default() -> Self {
        Tune::new()
    }
}

/// Creates the spin option for one scalar parameter. No option is created
/// when the computed range collapses to a point: there is nothing to tune.
fn make_option(options: &mut OptionMap, name: &str, v: i32, range: SetRange) -> Option<String> {
    let (min, max) = range.apply(v);
    if min == max {
        return None;
    }
    options.add(
        name,
        Opt::spin(v as i64, min as i64, max as i64).on_change(on_tune()),
    );
    // Formatted parameter line for the tuning harness.
    log::info!(
        "{},{},{},{},{},0.0020",
        name,
        v,
        min,
        max,
        (max - min) as f64 / 20.0
    );
    Some(name.to_string())
}

fn on_tune() -> OnChange {
    Arc::new(|engine: &mut Engine, value| {
        if !engine.tune.update_on_last || engine.tune.is_last(&value.name) {
            engine.read_tuned_options();
        }
    })
}
