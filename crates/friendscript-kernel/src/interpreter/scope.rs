//! Variable scopes for Friendscript.
//!
//! A [`Scope`] is a stack of frames. Each frame may point at a parent, and
//! reads fall through to parents unless the frame isolates reads. Writes go
//! to the frame that *owns* the name:
//!
//! - a frame that isolates writes, or already holds the name, owns it
//! - otherwise the nearest ancestor holding a non-null value owns it
//! - otherwise the frame the write started from owns it
//!
//! So loop and conditional bodies update outer variables transparently while
//! `declare` still lets them shadow.
//!
//! Block frames (pushed by the evaluator for conditionals and loops) differ in
//! the last rule only: a brand new name is handed on to the enclosing frame,
//! so variables first assigned inside an `if` body remain visible after it.
//! Names the construct declares for itself (guard bindings, `index`, loop
//! destinations) stay local because they are declared in the block frame.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Serialize, Serializer};

use friendscript_types::{Object, Value};

/// The discard target: assignments to `_` are dropped.
pub const PLACEHOLDER: &str = "_";

/// Upper bound on interpolation passes over one string.
pub const MAX_INTERPOLATION_PASSES: usize = 64;

static PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\$?([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}").expect("valid placeholder regex")
});

/// Handle to a frame within a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    /// Declared locally, no value yet.
    Unset,
    Set(Value),
}

#[derive(Debug, Clone, Default)]
struct Frame {
    parent: Option<FrameId>,
    vars: IndexMap<String, Slot>,
    isolated_reads: bool,
    isolated_writes: bool,
    /// New names are owned by the enclosing frame.
    block: bool,
    most_recent: Option<String>,
}

/// Variable scope with nested frames.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Frame arena. The last element is the current frame; index 0 is the root.
    frames: Vec<Frame>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Create a scope with one empty root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Create a scope whose root frame holds `values`.
    pub fn with_values(values: Object) -> Self {
        let mut scope = Self::new();
        for (name, value) in values {
            scope.set(&name, value);
        }
        scope
    }

    /// The innermost frame.
    pub fn current(&self) -> FrameId {
        FrameId(self.frames.len() - 1)
    }

    pub fn root(&self) -> FrameId {
        FrameId(0)
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn parent_of(&self, frame: FrameId) -> Option<FrameId> {
        self.frames.get(frame.0).and_then(|f| f.parent)
    }

    /// Push an ordinary child frame.
    pub fn push_frame(&mut self) -> FrameId {
        self.push(Frame::default())
    }

    /// Push a child frame with explicit isolation flags.
    ///
    /// `reads`: lookups stop at this frame. `writes`: this frame owns every
    /// name written through it.
    pub fn push_isolated_frame(&mut self, reads: bool, writes: bool) -> FrameId {
        self.push(Frame {
            isolated_reads: reads,
            isolated_writes: writes,
            ..Frame::default()
        })
    }

    /// Push a block frame for a conditional or loop.
    pub fn push_block_frame(&mut self) -> FrameId {
        self.push(Frame {
            block: true,
            ..Frame::default()
        })
    }

    fn push(&mut self, mut frame: Frame) -> FrameId {
        frame.parent = Some(self.current());
        self.frames.push(frame);
        self.current()
    }

    /// Pop the innermost frame.
    ///
    /// Panics if attempting to pop the root frame.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        } else {
            panic!("cannot pop the root scope frame");
        }
    }

    /// Mark `name` as present in the current frame without a value.
    ///
    /// Shadows any outer binding. An existing local value is kept.
    pub fn declare(&mut self, name: &str) {
        let key = root_key(name);
        if key == PLACEHOLDER {
            return;
        }
        let id = self.current();
        self.frames[id.0].vars.entry(key.to_string()).or_insert(Slot::Unset);
    }

    /// Set a variable in the frame that owns it.
    ///
    /// The value is auto-typed (see [`Value::normalize`]). Dotted names write
    /// into nested objects and arrays, creating objects along the way.
    pub fn set(&mut self, name: &str, value: Value) {
        let key = root_key(name);
        if key == PLACEHOLDER {
            return;
        }
        let current = self.current();
        let owner = self.owner_of(current, name);
        let value = value.normalize();

        let frame = &mut self.frames[owner.0];
        let segments: Vec<&str> = name.split('.').skip(1).collect();
        if segments.is_empty() {
            frame.vars.insert(key.to_string(), Slot::Set(value));
        } else {
            let slot = frame.vars.entry(key.to_string()).or_insert(Slot::Unset);
            let mut root = match std::mem::replace(slot, Slot::Unset) {
                Slot::Set(existing) => existing,
                Slot::Unset => Value::Null,
            };
            assign_path(&mut root, &segments, value);
            *slot = Slot::Set(root);
        }

        self.frames[current.0].most_recent = Some(name.to_string());
    }

    /// Serialize a host value and store it.
    ///
    /// Panics if `value` cannot be represented as a script value, which is a
    /// programming error in the host.
    pub fn set_serialized<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(name, Value::from(json)),
            Err(e) => panic!("cannot store '{name}' in scope: {e}"),
        }
    }

    /// Look up a variable, returning a copy.
    ///
    /// Declared-but-unset names read as `None` and hide outer bindings.
    pub fn get(&self, name: &str) -> Option<Value> {
        let key = root_key(name);
        let mut cursor = Some(self.current());
        while let Some(id) = cursor {
            let frame = &self.frames[id.0];
            if let Some(slot) = frame.vars.get(key) {
                return match slot {
                    Slot::Set(value) => lookup_path(value, name),
                    Slot::Unset => None,
                };
            }
            if frame.isolated_reads {
                return None;
            }
            cursor = frame.parent;
        }
        None
    }

    /// [`Scope::get`] with a fallback for absent names.
    pub fn get_or(&self, name: &str, fallback: Value) -> Value {
        self.get(name).unwrap_or(fallback)
    }

    /// True when `name` is *not* present in the current frame.
    ///
    /// The inverted sense matches how the evaluator asks the question:
    /// "would writing here create a new local?"
    pub fn is_local(&self, name: &str) -> bool {
        !self.frames[self.current().0].vars.contains_key(root_key(name))
    }

    /// The frame that a write of `name` starting at `from` lands in.
    pub fn owner_of(&self, from: FrameId, name: &str) -> FrameId {
        let key = root_key(name);
        let frame = &self.frames[from.0];
        if frame.isolated_writes || frame.vars.contains_key(key) {
            return from;
        }

        let mut cursor = frame.parent;
        while let Some(id) = cursor {
            let ancestor = &self.frames[id.0];
            if let Some(Slot::Set(value)) = ancestor.vars.get(key) {
                if !value.is_null() {
                    return id;
                }
            }
            cursor = ancestor.parent;
        }

        self.home_of_new(from)
    }

    /// Where a name nobody holds is created, starting from `from`.
    fn home_of_new(&self, from: FrameId) -> FrameId {
        let mut id = from;
        loop {
            let frame = &self.frames[id.0];
            match frame.parent {
                Some(parent) if frame.block && !frame.isolated_writes => id = parent,
                _ => return id,
            }
        }
    }

    /// Value of the most recently set name in the current frame.
    pub fn most_recent_value(&self) -> Option<Value> {
        self.frames[self.current().0]
            .most_recent
            .as_deref()
            .and_then(|name| self.get(name))
    }

    /// Replace `{name}` / `{$name}` placeholders with variable text.
    ///
    /// Absent names become the empty string. Substitution repeats on the
    /// result, at most [`MAX_INTERPOLATION_PASSES`] times, so values that
    /// themselves contain placeholders cannot loop forever.
    pub fn interpolate(&self, text: &str) -> String {
        let mut out = text.to_string();
        for _ in 0..MAX_INTERPOLATION_PASSES {
            let Some(captures) = PLACEHOLDER_PATTERN.captures(&out) else {
                break;
            };
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                break;
            };
            let replacement = self.get(name.as_str()).map(|v| v.as_text()).unwrap_or_default();
            out.replace_range(whole.range(), &replacement);
        }
        out
    }

    /// Every visible, set variable as one object. Inner frames win.
    pub fn snapshot(&self) -> Object {
        let mut chain = Vec::new();
        let mut cursor = Some(self.current());
        while let Some(id) = cursor {
            let frame = &self.frames[id.0];
            chain.push(frame);
            if frame.isolated_reads {
                break;
            }
            cursor = frame.parent;
        }

        let mut merged = Object::new();
        for frame in chain.into_iter().rev() {
            for (name, slot) in &frame.vars {
                match slot {
                    Slot::Set(value) => {
                        merged.insert(name.clone(), value.clone());
                    }
                    Slot::Unset => {
                        merged.shift_remove(name);
                    }
                }
            }
        }
        merged
    }

    /// Names present in the current frame, set or not.
    pub fn local_names(&self) -> Vec<String> {
        self.frames[self.current().0].vars.keys().cloned().collect()
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

fn root_key(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

fn lookup_path(root: &Value, name: &str) -> Option<Value> {
    let mut current = root;
    for segment in name.split('.').skip(1) {
        current = current.child(segment)?;
    }
    Some(current.clone())
}

fn assign_path(target: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    if let Value::Array(items) = target {
        if let Ok(index) = first.parse::<usize>() {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            assign_path(&mut items[index], rest, value);
            return;
        }
    }

    if !matches!(target, Value::Object(_)) {
        *target = Value::Object(Object::new());
    }
    if let Some(child) = target.child_mut_or_insert(first) {
        assign_path(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_scope_has_one_frame() {
        let scope = Scope::new();
        assert_eq!(scope.depth(), 1);
        assert_eq!(scope.current(), scope.root());
    }

    #[test]
    fn reads_are_copies() {
        let mut scope = Scope::new();
        scope.set("list", Value::Array(vec![Value::Int(1)]));
        let mut copy = scope.get("list").expect("set");
        if let Value::Array(items) = &mut copy {
            items.push(Value::Int(2));
        }
        assert_eq!(scope.get("list"), Some(Value::Array(vec![Value::Int(1)])));
    }

    #[test]
    fn values_are_auto_typed() {
        let mut scope = Scope::new();
        scope.set("n", Value::from("42"));
        scope.set("zip", Value::from("02134"));
        assert_eq!(scope.get("n"), Some(Value::Int(42)));
        assert_eq!(scope.get("zip"), Some(Value::from("02134")));
    }

    #[test]
    fn child_updates_value_held_by_parent() {
        let mut scope = Scope::new();
        scope.set("k", Value::Int(1));
        let child = scope.push_frame();
        scope.set("k", Value::Int(2));
        assert!(scope.is_local("k"));
        assert_eq!(scope.owner_of(child, "k"), scope.root());
        scope.pop_frame();
        assert_eq!(scope.get("k"), Some(Value::Int(2)));
    }

    #[test]
    fn unknown_names_are_created_in_the_child() {
        let mut scope = Scope::new();
        scope.push_frame();
        scope.set("k", Value::Int(1));
        assert!(!scope.is_local("k"));
        scope.pop_frame();
        assert_eq!(scope.get("k"), None);
    }

    #[test]
    fn isolated_writes_keep_values_local() {
        let mut scope = Scope::new();
        scope.set("k", Value::Int(1));
        scope.push_isolated_frame(false, true);
        scope.set("k", Value::Int(2));
        assert_eq!(scope.get("k"), Some(Value::Int(2)));
        scope.pop_frame();
        assert_eq!(scope.get("k"), Some(Value::Int(1)));
    }

    #[test]
    fn isolated_reads_hide_parents() {
        let mut scope = Scope::new();
        scope.set("k", Value::Int(1));
        scope.push_isolated_frame(true, false);
        assert_eq!(scope.get("k"), None);
    }

    #[test]
    fn declare_shadows_as_unset() {
        let mut scope = Scope::new();
        scope.set("k", Value::Int(1));
        scope.push_frame();
        scope.declare("k");
        assert_eq!(scope.get("k"), None);
        scope.set("k", Value::Int(5));
        scope.pop_frame();
        assert_eq!(scope.get("k"), Some(Value::Int(1)));
    }

    #[test]
    fn declare_keeps_existing_local_value() {
        let mut scope = Scope::new();
        scope.set("k", Value::Int(1));
        scope.declare("k");
        assert_eq!(scope.get("k"), Some(Value::Int(1)));
    }

    #[test]
    fn block_frames_hand_new_names_outward() {
        let mut scope = Scope::new();
        scope.push_block_frame();
        scope.declare("index");
        scope.set("index", Value::Int(0));
        scope.set("fresh", Value::from("x"));
        scope.pop_frame();
        assert_eq!(scope.get("fresh"), Some(Value::from("x")));
        assert_eq!(scope.get("index"), None);
    }

    #[test]
    fn nested_block_frames_reach_the_first_ordinary_frame() {
        let mut scope = Scope::new();
        scope.push_frame();
        scope.push_block_frame();
        scope.push_block_frame();
        scope.set("fresh", Value::Int(1));
        scope.pop_frame();
        scope.pop_frame();
        assert!(!scope.is_local("fresh"));
        scope.pop_frame();
        assert_eq!(scope.get("fresh"), None);
    }

    #[test]
    fn placeholder_is_never_stored() {
        let mut scope = Scope::new();
        scope.set(PLACEHOLDER, Value::Int(1));
        scope.declare(PLACEHOLDER);
        assert_eq!(scope.get(PLACEHOLDER), None);
        assert!(scope.snapshot().is_empty());
    }

    #[test]
    fn dotted_paths() {
        let mut scope = Scope::new();
        scope.set("user.name", Value::from("ada"));
        scope.set("user.tags.1", Value::from("b"));
        assert_eq!(scope.get("user.name"), Some(Value::from("ada")));
        assert_eq!(
            scope.get("user.tags"),
            Some(Value::Object(Object::from([("1".to_string(), Value::from("b"))])))
        );

        scope.set("list", Value::Array(vec![Value::Int(1), Value::Int(2)]));
        scope.set("list.3", Value::Int(4));
        assert_eq!(
            scope.get("list"),
            Some(Value::Array(vec![Value::Int(1), Value::Int(2), Value::Null, Value::Int(4)]))
        );
        assert_eq!(scope.get("list.9"), None);
    }

    #[test]
    fn most_recent_value_tracks_current_frame() {
        let mut scope = Scope::new();
        assert_eq!(scope.most_recent_value(), None);
        scope.set("a", Value::Int(1));
        scope.set("b", Value::Int(2));
        assert_eq!(scope.most_recent_value(), Some(Value::Int(2)));
    }

    #[rstest]
    #[case("Hello {name}", "Hello World")]
    #[case("Hello {$name}", "Hello World")]
    #[case("Hello {missing}", "Hello ")]
    #[case("{user.name} is {user.age}", "ada is 36")]
    #[case("unterminated {name", "unterminated {name")]
    #[case("{not a placeholder}", "{not a placeholder}")]
    fn interpolation(#[case] template: &str, #[case] expected: &str) {
        let mut scope = Scope::new();
        scope.set("name", Value::from("World"));
        scope.set("user", Value::from(serde_json::json!({"name": "ada", "age": 36})));
        assert_eq!(scope.interpolate(template), expected);
    }

    #[test]
    fn interpolation_pass_count_is_bounded() {
        let mut scope = Scope::new();
        scope.set("loop", Value::from("{loop}"));
        assert_eq!(scope.interpolate("{loop}"), "{loop}");

        scope.set("grow", Value::from("x{grow}"));
        let out = scope.interpolate("{grow}");
        assert_eq!(out, format!("{}{{grow}}", "x".repeat(MAX_INTERPOLATION_PASSES)));
    }

    #[test]
    fn snapshot_merges_visible_frames() {
        let mut scope = Scope::new();
        scope.set("a", Value::Int(1));
        scope.set("b", Value::Int(2));
        scope.push_frame();
        scope.declare("b");
        scope.set("c", Value::Int(3));
        let snapshot = scope.snapshot();
        assert_eq!(snapshot.get("a"), Some(&Value::Int(1)));
        assert_eq!(snapshot.get("b"), None);
        assert_eq!(snapshot.get("c"), Some(&Value::Int(3)));

        let json = serde_json::to_value(&scope).expect("serialize");
        assert_eq!(json, serde_json::json!({"a": 1, "c": 3}));
    }

    #[test]
    fn set_serialized_stores_host_structs() {
        #[derive(Serialize)]
        struct Point {
            x: i64,
            y: i64,
        }
        let mut scope = Scope::new();
        scope.set_serialized("p", &Point { x: 1, y: 2 });
        assert_eq!(scope.get("p.y"), Some(Value::Int(2)));
    }

    #[test]
    #[should_panic(expected = "cannot store")]
    fn set_serialized_panics_on_unrepresentable_values() {
        let mut scope = Scope::new();
        let bad = std::collections::HashMap::from([((1, 2), 3)]);
        scope.set_serialized("bad", &bad);
    }

    #[test]
    #[should_panic(expected = "cannot pop the root scope frame")]
    fn popping_root_panics() {
        let mut scope = Scope::new();
        scope.pop_frame();
    }
}
