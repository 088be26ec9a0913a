//! Session lifecycle and the one-shot snapshot load.
//!
//! ```text
//!  Uninitialized ──attach──► Hydrating ──snapshot applied──► Synced
//!        ▲                       │                             │
//!        └──────── failure ──────┘◄──────────── detach ────────┘
//! ```
//!
//! Hydration builds a complete replacement [`SceneStore`] from one read of
//! the document and hands it back whole. The caller swaps it in only on
//! success, so a failure part-way through leaves the previous scene as it
//! was.

use easel_core::{CanvasSetting, DecodeError, ObjectId, ObjectProps, SceneError, SceneStore, TxOrigin};

use crate::document::{DocumentError, DocumentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No document. Local edits stay local.
    Uninitialized,
    /// Document attached, snapshot not yet applied. Both sync directions off.
    Hydrating,
    /// Steady state.
    Synced,
}

impl SessionState {
    pub fn is_synced(&self) -> bool {
        matches!(self, SessionState::Synced)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Hydrating => write!(f, "hydrating"),
            SessionState::Synced => write!(f, "synced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HydrationError {
    /// The initial state could not be fetched.
    Fetch(String),
    /// The fetched state could not be applied to the document.
    Document(DocumentError),
    /// An object or setting in the snapshot is unreadable.
    Malformed { key: String, reason: String },
    Scene(SceneError),
}

impl std::fmt::Display for HydrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "Initial state fetch failed: {e}"),
            Self::Document(e) => write!(f, "Initial state rejected: {e}"),
            Self::Malformed { key, reason } => write!(f, "Malformed snapshot entry {key}: {reason}"),
            Self::Scene(e) => write!(f, "Scene rejected snapshot: {e}"),
        }
    }
}

impl std::error::Error for HydrationError {}

impl From<DocumentError> for HydrationError {
    fn from(e: DocumentError) -> Self {
        HydrationError::Document(e)
    }
}

impl From<SceneError> for HydrationError {
    fn from(e: SceneError) -> Self {
        HydrationError::Scene(e)
    }
}

/// What a successful hydration loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationReport {
    pub objects: Vec<ObjectId>,
    /// Entries with a type or setting this build does not know.
    pub skipped: Vec<String>,
    pub canvas_settings: usize,
}

/// Build a scene from a document snapshot.
///
/// Unknown object types and unknown settings are skipped. Anything else
/// that fails to decode aborts the whole build.
pub fn build_scene(snapshot: &DocumentSnapshot) -> Result<(SceneStore, HydrationReport), HydrationError> {
    let mut scene = SceneStore::new();
    let mut report = HydrationReport::default();

    for (id, value) in &snapshot.objects {
        let props = match decode_object(id, value.as_deref()) {
            Ok(props) => props,
            Err(e) if e.is_unknown_type() => {
                log::warn!("Hydration skipping object {id}: {e}");
                report.skipped.push(id.to_string());
                continue;
            }
            Err(e) => return Err(malformed(id.as_str(), e)),
        };
        scene.apply_remote_upsert(id.clone(), props, TxOrigin::Hydration)?;
        report.objects.push(id.clone());
    }

    for (key, value) in &snapshot.canvas {
        let Some(json) = value.as_deref() else {
            return Err(malformed(key, DecodeError::Malformed("not a JSON string".into())));
        };
        match CanvasSetting::decode(key, json) {
            Ok(setting) => {
                scene.apply_remote_canvas(setting, TxOrigin::Hydration)?;
                report.canvas_settings += 1;
            }
            Err(e) if e.is_unknown_type() => {
                log::warn!("Hydration skipping canvas setting {key}: {e}");
                report.skipped.push(key.clone());
            }
            Err(e) => return Err(malformed(key, e)),
        }
    }

    scene.recompute_geometry(&report.objects);
    scene.drain_events();
    Ok((scene, report))
}

fn decode_object(id: &ObjectId, value: Option<&str>) -> Result<ObjectProps, DecodeError> {
    let json = value.ok_or_else(|| DecodeError::Malformed(format!("{id} is not a JSON string")))?;
    ObjectProps::from_json(json)
}

fn malformed(key: &str, e: DecodeError) -> HydrationError {
    HydrationError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::DrawableObject;

    fn rect_json(left: f64) -> Option<String> {
        DrawableObject::rectangle(left, 0.0, 10.0, 10.0)
            .serialize()
            .to_json()
            .ok()
    }

    #[test]
    fn test_builds_objects_and_canvas() {
        let snapshot = DocumentSnapshot {
            objects: vec![(ObjectId::new("a"), rect_json(1.0)), (ObjectId::new("b"), rect_json(2.0))],
            canvas: vec![("width".into(), Some("640".into()))],
        };
        let (scene, report) = build_scene(&snapshot).unwrap();

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.canvas().width, 640.0);
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.canvas_settings, 1);
        assert_eq!(scene.pending_events(), 0);
        assert!(scene.check_invariants().is_ok());
        // Geometry is current after the build.
        assert_eq!(scene.get("b").unwrap().geometry().bounds.x, 2.0);
    }

    #[test]
    fn test_unknown_entries_are_skipped() {
        let snapshot = DocumentSnapshot {
            objects: vec![
                (ObjectId::new("a"), rect_json(1.0)),
                (ObjectId::new("z"), Some(r#"{"type":"hologram","left":0}"#.into())),
            ],
            canvas: vec![("gridSize".into(), Some("8".into()))],
        };
        let (scene, report) = build_scene(&snapshot).unwrap();

        assert_eq!(scene.ids(), vec![ObjectId::new("a")]);
        assert_eq!(report.skipped, vec!["z".to_string(), "gridSize".to_string()]);
    }

    #[test]
    fn test_malformed_object_is_fatal() {
        let snapshot = DocumentSnapshot {
            objects: vec![
                (ObjectId::new("a"), rect_json(1.0)),
                (ObjectId::new("b"), Some(r#"{"type":"rectangle","width":"wide"}"#.into())),
            ],
            canvas: vec![],
        };
        match build_scene(&snapshot) {
            Err(HydrationError::Malformed { key, .. }) => assert_eq!(key, "b"),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_string_value_is_fatal() {
        let snapshot = DocumentSnapshot {
            objects: vec![(ObjectId::new("a"), None)],
            canvas: vec![],
        };
        assert!(matches!(build_scene(&snapshot), Err(HydrationError::Malformed { .. })));
    }
}
