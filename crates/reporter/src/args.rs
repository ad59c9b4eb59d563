//! Rendering of command arguments into step names
//!
//! Functions render as a fixed placeholder, DOM-like objects as their
//! selector or tag and class, everything else through a depth-limited
//! inspector. Hosts encode shared and self-referential structures with
//! `$id` markers on objects and `{"$ref": n}` back-references; the inspector
//! keeps a seen-set of the ids on the current path so a cycle renders as
//! `[Circular]` instead of recursing.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

pub const FUNCTION_PLACEHOLDER: &str = "[function]";

const MAX_DEPTH: usize = 2;
const MAX_STRING_LENGTH: usize = 40;

/// Step name for a command and its arguments: `name ("a"; "b")`
pub fn command_step_name(name: &str, args: &[Value]) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| format!("\"{}\"", display_arg(arg)))
        .collect();
    format!("{} ({})", name, rendered.join("; "))
}

/// Render a single argument
pub fn display_arg(arg: &Value) -> String {
    match arg {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if is_function(map) {
                return FUNCTION_PLACEHOLDER.to_string();
            }
            if let Some(selector) = map.get("selector").and_then(Value::as_str) {
                return selector.to_string();
            }
            if let Some(tag) = map.get("localName").and_then(Value::as_str) {
                return match map.get("className").and_then(Value::as_str) {
                    Some(class) if !class.is_empty() => format!("{}.{}", tag, class),
                    _ => tag.to_string(),
                };
            }
            Inspector::new(arg).inspect(arg, 0)
        }
        Value::Array(_) => Inspector::new(arg).inspect(arg, 0),
    }
}

fn is_function(map: &Map<String, Value>) -> bool {
    map.get("$type").and_then(Value::as_str) == Some("function")
}

fn marker(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key).and_then(Value::as_u64)
}

/// Depth-limited renderer with a cycle guard
struct Inspector<'a> {
    registry: HashMap<u64, &'a Value>,
    seen: HashSet<u64>,
    resolving: HashSet<u64>,
}

impl<'a> Inspector<'a> {
    fn new(root: &'a Value) -> Self {
        let mut registry = HashMap::new();
        register(root, &mut registry);
        Self {
            registry,
            seen: HashSet::new(),
            resolving: HashSet::new(),
        }
    }

    fn inspect(&mut self, value: &'a Value, depth: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote(s),
            Value::Array(items) => {
                if items.is_empty() {
                    return "[]".to_string();
                }
                if depth >= MAX_DEPTH {
                    return "[Array]".to_string();
                }
                let parts: Vec<String> =
                    items.iter().map(|v| self.inspect(v, depth + 1)).collect();
                format!("[ {} ]", parts.join(", "))
            }
            Value::Object(map) => self.inspect_object(map, depth),
        }
    }

    fn inspect_object(&mut self, map: &'a Map<String, Value>, depth: usize) -> String {
        if is_function(map) {
            return "[Function]".to_string();
        }
        let own_id = marker(map, "$id");
        if let Some(target) = marker(map, "$ref") {
            if self.seen.contains(&target) || !self.resolving.insert(target) {
                return "[Circular]".to_string();
            }
            let fresh_id = own_id.filter(|id| self.seen.insert(*id));
            let rendered = match self.registry.get(&target).copied() {
                Some(resolved) => self.inspect(resolved, depth),
                None => "[Object]".to_string(),
            };
            if let Some(id) = fresh_id {
                self.seen.remove(&id);
            }
            self.resolving.remove(&target);
            return rendered;
        }

        if let Some(id) = own_id {
            if !self.seen.insert(id) {
                return "[Circular]".to_string();
            }
        }

        let entries: Vec<(&String, &'a Value)> =
            map.iter().filter(|(k, _)| k.as_str() != "$id").collect();
        let rendered = if entries.is_empty() {
            "{}".to_string()
        } else if depth >= MAX_DEPTH {
            "[Object]".to_string()
        } else {
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", key(k), self.inspect(v, depth + 1)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        };

        if let Some(id) = own_id {
            self.seen.remove(&id);
        }
        rendered
    }
}

fn register<'a>(value: &'a Value, registry: &mut HashMap<u64, &'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| register(v, registry)),
        Value::Object(map) => {
            if let Some(id) = marker(map, "$id") {
                registry.entry(id).or_insert(value);
            }
            map.values().for_each(|v| register(v, registry));
        }
        _ => {}
    }
}

fn quote(s: &str) -> String {
    let total = s.chars().count();
    if total > MAX_STRING_LENGTH {
        let head: String = s.chars().take(MAX_STRING_LENGTH).collect();
        format!(
            "'{}'... {} more character{}",
            head,
            total - MAX_STRING_LENGTH,
            if total - MAX_STRING_LENGTH == 1 { "" } else { "s" }
        )
    } else {
        format!("'{}'", s)
    }
}

fn key(k: &str) -> String {
    let mut chars = k.chars();
    let identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if identifier {
        k.to_string()
    } else {
        format!("'{}'", k)
    }
}
