use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identifies a single monitored data point on an agent.
///
/// Equality, hashing and ordering look at the agent, element and parameter
/// ids plus the *effective instance*: the primary key instance, or the
/// display instance when the key has none. Two keys read back from different
/// sources with the same instance but different display formatting therefore
/// compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterKey {
    pub data_miner_id: i32,
    pub element_id: i32,
    pub parameter_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_instance: Option<String>,
}

impl ParameterKey {
    pub fn new(data_miner_id: i32, element_id: i32, parameter_id: i32) -> Self {
        Self {
            data_miner_id,
            element_id,
            parameter_id,
            instance: None,
            display_instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_display_instance(mut self, display_instance: impl Into<String>) -> Self {
        self.display_instance = Some(display_instance.into());
        self
    }

    /// Instance used for comparison: primary key first, display key as fallback.
    pub fn effective_instance(&self) -> &str {
        match self.instance.as_deref() {
            Some(i) if !i.is_empty() => i,
            _ => self.display_instance.as_deref().unwrap_or(""),
        }
    }

    /// Instance shown to operators: display key first, primary key as fallback.
    pub fn shown_instance(&self) -> &str {
        match self.display_instance.as_deref() {
            Some(i) if !i.is_empty() => i,
            _ => self.instance.as_deref().unwrap_or(""),
        }
    }

    fn identity(&self) -> (i32, i32, i32, &str) {
        (
            self.data_miner_id,
            self.element_id,
            self.parameter_id,
            self.effective_instance(),
        )
    }
}

impl PartialEq for ParameterKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ParameterKey {}

impl Hash for ParameterKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for ParameterKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParameterKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// Formats as `dma/element/parameter[/instance]`.
impl std::fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.data_miner_id, self.element_id, self.parameter_id
        )?;
        let instance = self.shown_instance();
        if !instance.is_empty() {
            write!(f, "/{}", instance)?;
        }
        Ok(())
    }
}

/// Format a list of keys as `[a, b, c]`.
pub fn parameter_keys_to_string<'a>(keys: impl IntoIterator<Item = &'a ParameterKey>) -> String {
    let parts: Vec<String> = keys.into_iter().map(|k| k.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// A parameter inside a subgroup, optionally carrying the label shared by
/// every subgroup of a shared-model group at the same position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgroupParameter {
    pub key: ParameterKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SubgroupParameter {
    pub fn new(key: ParameterKey) -> Self {
        Self { key, label: None }
    }

    pub fn labeled(key: ParameterKey, label: impl Into<String>) -> Self {
        Self {
            key,
            label: Some(label.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_instance_formatting_does_not_affect_equality() {
        let a = ParameterKey::new(1, 2, 3).with_instance("7");
        let b = ParameterKey::new(1, 2, 3)
            .with_instance("7")
            .with_display_instance("Port 7");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn display_instance_used_when_primary_missing() {
        let a = ParameterKey::new(1, 2, 3).with_display_instance("eth0");
        let b = ParameterKey::new(1, 2, 3).with_instance("eth0");
        assert_eq!(a, b);
        assert_ne!(a, ParameterKey::new(1, 2, 3));
    }

    #[test]
    fn ordering_is_by_ids_then_instance() {
        let mut keys = vec![
            ParameterKey::new(1, 2, 4),
            ParameterKey::new(1, 2, 3).with_instance("b"),
            ParameterKey::new(1, 2, 3).with_instance("a"),
            ParameterKey::new(1, 1, 9),
        ];
        keys.sort();
        assert_eq!(keys[0], ParameterKey::new(1, 1, 9));
        assert_eq!(keys[1].effective_instance(), "a");
        assert_eq!(keys[2].effective_instance(), "b");
        assert_eq!(keys[3], ParameterKey::new(1, 2, 4));
    }

    #[test]
    fn display_prefers_display_instance() {
        let key = ParameterKey::new(5, 10, 100)
            .with_instance("1")
            .with_display_instance("Port 1");
        assert_eq!(key.to_string(), "5/10/100/Port 1");
        assert_eq!(ParameterKey::new(5, 10, 100).to_string(), "5/10/100");
        assert_eq!(
            parameter_keys_to_string(&[ParameterKey::new(1, 1, 1), ParameterKey::new(1, 1, 2)]),
            "[1/1/1, 1/1/2]"
        );
    }
}
