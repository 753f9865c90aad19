//! Service ledger document (`service_data.json`)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::LedgerError;

/// Whole ledger document. Only `profiles` is interpreted here; every other
/// key (model name, code contents, disk size, ...) is carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceData {
    #[serde(default)]
    pub profiles: Vec<NodeProfile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate profile of one model service instance on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProfile {
    pub node_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub initialization_time_ms: f64,
    #[serde(default)]
    pub eviction_time_ms: f64,
    #[serde(default)]
    pub initialization_cost: f64,
    #[serde(default)]
    pub keep_alive_cost: f64,
    #[serde(default)]
    pub energy_consumption_idle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<ResourceProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub xai: Vec<XaiProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_container_cpu_memory_usage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_container_device_memory_usage: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeProfile {
    fn new(node_id: String, device_type: String, device_name: String, initialization_time_ms: f64) -> Self {
        Self {
            node_id,
            device_type,
            device_name,
            initialization_time_ms,
            eviction_time_ms: 0.0,
            initialization_cost: 0.0,
            keep_alive_cost: 0.0,
            energy_consumption_idle: 0.0,
            inference: None,
            xai: Vec::new(),
            idle_container_cpu_memory_usage: None,
            idle_container_device_memory_usage: None,
            extra: Map::new(),
        }
    }
}

/// Resource usage of one request type, in ledger units (ms and MB).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    #[serde(default)]
    pub cpu_time_ms: f64,
    #[serde(default)]
    pub device_time_ms: f64,
    #[serde(rename = "cpu_memory_usage_MB", default)]
    pub cpu_memory_usage_mb: f64,
    #[serde(rename = "self_cpu_memory_usage_MB", default)]
    pub self_cpu_memory_usage_mb: f64,
    #[serde(rename = "device_memory_usage_MB", default)]
    pub device_memory_usage_mb: f64,
    #[serde(rename = "self_device_memory_usage_MB", default)]
    pub self_device_memory_usage_mb: f64,
    #[serde(default)]
    pub energy_consumption_execution: f64,
    #[serde(rename = "disk_IO_MB", default)]
    pub disk_io_mb: f64,
    #[serde(rename = "input_data_MB", default)]
    pub input_data_mb: f64,
    #[serde(rename = "output_data_MB", default)]
    pub output_data_mb: f64,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub execution_cost: f64,
}

/// Resource usage of one explanation method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XaiProfile {
    pub xai_method: String,
    #[serde(flatten)]
    pub resources: ResourceProfile,
}

/// Finalized aggregate ready to be written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub node_id: String,
    pub device_type: String,
    pub device_name: String,
    pub initialization_time_ms: f64,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Inference(ResourceProfile),
    Xai(XaiProfile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Replaced,
    Appended,
}

/// Insert `entry` into the ledger, replacing the profile of the same node
/// if there is one.
///
/// Later profiles carrying the same node id are dropped so that the ledger
/// holds exactly one profile per node afterwards.
pub fn upsert(ledger: &mut ServiceData, entry: LedgerEntry) -> UpsertOutcome {
    let Some(position) = ledger.profiles.iter().position(|p| p.node_id == entry.node_id) else {
        let mut profile = NodeProfile::new(
            entry.node_id,
            entry.device_type,
            entry.device_name,
            entry.initialization_time_ms,
        );
        match entry.kind {
            EntryKind::Inference(resources) => profile.inference = Some(resources),
            EntryKind::Xai(xai) => profile.xai.push(xai),
        }
        ledger.profiles.push(profile);
        return UpsertOutcome::Appended;
    };

    let profile = &mut ledger.profiles[position];
    profile.device_type = entry.device_type;
    profile.device_name = entry.device_name;
    profile.initialization_time_ms = entry.initialization_time_ms;
    match entry.kind {
        EntryKind::Inference(resources) => profile.inference = Some(resources),
        EntryKind::Xai(xai) => {
            match profile.xai.iter_mut().find(|existing| existing.xai_method == xai.xai_method) {
                Some(existing) => *existing = xai,
                None => profile.xai.push(xai),
            }
        }
    }

    let node_id = profile.node_id.clone();
    let mut index = 0;
    ledger.profiles.retain(|p| {
        let keep = index <= position || p.node_id != node_id;
        index += 1;
        keep
    });

    UpsertOutcome::Replaced
}

impl ServiceData {
    pub fn upsert(&mut self, entry: LedgerEntry) -> UpsertOutcome {
        upsert(self, entry)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.node_id.as_str()).collect()
    }

    pub fn profile(&self, node_id: &str) -> Option<&NodeProfile> {
        self.profiles.iter().find(|p| p.node_id == node_id)
    }

    /// Record the memory an idle container holds on `node_id`.
    pub fn set_idle_usage(&mut self, node_id: &str, cpu_bytes: i64, device_bytes: i64) -> Result<(), LedgerError> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.node_id == node_id)
            .ok_or_else(|| LedgerError::UnknownNode(node_id.to_string()))?;
        profile.idle_container_cpu_memory_usage = Some(cpu_bytes);
        profile.idle_container_device_memory_usage = Some(device_bytes);
        Ok(())
    }

    pub fn model_name(&self) -> Option<&str> {
        self.extra.get("model_name").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inference_entry(node_id: &str, cpu_time_ms: f64) -> LedgerEntry {
        LedgerEntry {
            node_id: node_id.to_string(),
            device_type: "CPU".to_string(),
            device_name: "cpu".to_string(),
            initialization_time_ms: 1200.0,
            kind: EntryKind::Inference(ResourceProfile {
                cpu_time_ms,
                ..Default::default()
            }),
        }
    }

    fn xai_entry(node_id: &str, method: &str, cpu_time_ms: f64) -> LedgerEntry {
        LedgerEntry {
            node_id: node_id.to_string(),
            device_type: "CPU".to_string(),
            device_name: "cpu".to_string(),
            initialization_time_ms: 1200.0,
            kind: EntryKind::Xai(XaiProfile {
                xai_method: method.to_string(),
                resources: ResourceProfile {
                    cpu_time_ms,
                    ..Default::default()
                },
            }),
        }
    }

    #[test]
    fn test_upsert_new_node_appends_and_keeps_order() {
        let mut ledger = ServiceData::default();
        assert_eq!(ledger.upsert(inference_entry("A", 1.0)), UpsertOutcome::Appended);
        assert_eq!(ledger.upsert(inference_entry("B", 2.0)), UpsertOutcome::Appended);

        assert_eq!(ledger.node_ids(), vec!["A", "B"]);
        assert_eq!(ledger.profiles[0].inference.as_ref().unwrap().cpu_time_ms, 1.0);
    }

    #[test]
    fn test_upsert_existing_node_replaces_in_place() {
        let mut ledger = ServiceData::default();
        ledger.upsert(inference_entry("A", 1.0));
        ledger.upsert(inference_entry("B", 2.0));

        assert_eq!(ledger.upsert(inference_entry("A", 9.0)), UpsertOutcome::Replaced);
        assert_eq!(ledger.profiles.len(), 2);
        assert_eq!(ledger.node_ids(), vec!["A", "B"]);
        assert_eq!(ledger.profiles[0].inference.as_ref().unwrap().cpu_time_ms, 9.0);
    }

    #[test]
    fn test_upsert_collapses_duplicate_nodes() {
        let raw = r#"{"profiles": [
            {"node_id": "A"}, {"node_id": "B"}, {"node_id": "A", "stale": true}
        ]}"#;
        let mut ledger: ServiceData = serde_json::from_str(raw).unwrap();

        ledger.upsert(inference_entry("A", 3.0));
        assert_eq!(ledger.node_ids(), vec!["A", "B"]);
    }

    #[test]
    fn test_upsert_preserves_unknown_keys_and_xai() {
        let raw = r#"{
            "model_name": "microsoft/resnet-50",
            "profiles": [{
                "node_id": "A",
                "idle_container_cpu_memory_usage": 100,
                "custom": "kept",
                "xai": [{"xai_method": "GradCAM", "cpu_time_ms": 5.0}]
            }]
        }"#;
        let mut ledger: ServiceData = serde_json::from_str(raw).unwrap();
        ledger.upsert(inference_entry("A", 7.0));

        let profile = ledger.profile("A").unwrap();
        assert_eq!(profile.extra.get("custom"), Some(&Value::from("kept")));
        assert_eq!(profile.idle_container_cpu_memory_usage, Some(100));
        assert_eq!(profile.xai.len(), 1);
        assert_eq!(ledger.model_name(), Some("microsoft/resnet-50"));
    }

    #[test]
    fn test_xai_upsert_per_method() {
        let mut ledger = ServiceData::default();
        ledger.upsert(inference_entry("A", 1.0));

        ledger.upsert(xai_entry("A", "GradCAM", 10.0));
        ledger.upsert(xai_entry("A", "ScoreCAM", 20.0));
        ledger.upsert(xai_entry("A", "GradCAM", 30.0));

        let profile = ledger.profile("A").unwrap();
        assert!(profile.inference.is_some());
        let methods: Vec<_> = profile.xai.iter().map(|x| x.xai_method.as_str()).collect();
        assert_eq!(methods, vec!["GradCAM", "ScoreCAM"]);
        assert_eq!(profile.xai[0].resources.cpu_time_ms, 30.0);
    }

    #[test]
    fn test_xai_upsert_for_new_node_appends_profile() {
        let mut ledger = ServiceData::default();
        assert_eq!(ledger.upsert(xai_entry("C", "EigenCAM", 4.0)), UpsertOutcome::Appended);

        let profile = ledger.profile("C").unwrap();
        assert!(profile.inference.is_none());
        assert_eq!(profile.xai[0].xai_method, "EigenCAM");
    }

    #[test]
    fn test_resource_profile_wire_names() {
        let profile = ResourceProfile {
            cpu_memory_usage_mb: 1.5,
            disk_io_mb: 0.0,
            ..Default::default()
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["cpu_memory_usage_MB"], 1.5);
        assert!(json.get("disk_IO_MB").is_some());
        assert!(json.get("execution_time_ms").is_some());
    }

    #[test]
    fn test_set_idle_usage_unknown_node() {
        let mut ledger = ServiceData::default();
        ledger.upsert(inference_entry("A", 1.0));

        ledger.set_idle_usage("A", 2048, 0).unwrap();
        assert_eq!(ledger.profile("A").unwrap().idle_container_cpu_memory_usage, Some(2048));
        assert!(matches!(
            ledger.set_idle_usage("Z", 1, 1),
            Err(LedgerError::UnknownNode(id)) if id == "Z"
        ));
    }
}
