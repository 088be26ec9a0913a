//! Drawable objects and their wire mapping.
//!
//! Every object kind is a closed variant of [`Shape`]. On the wire an object
//! is a flat JSON map: the common [`BaseProps`] fields, the variant's own
//! fields, and a `"type"` discriminator. Only these allow-listed fields are
//! replicated; selection, hover and derived geometry stay local.
//!
//! ```text
//! {"type":"rectangle","left":10,"top":10,"angle":0,"scaleX":1,...,"width":80,"height":40}
//!  └── discriminator ─┘└────────── BaseProps ──────────────────┘└── RectangleProps ──┘
//! ```

use std::borrow::Borrow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::geometry::{self, DerivedGeometry};

/// Stable object identifier. Opaque to the engine; locally created objects
/// get a UUID v4 string, peers may use any unique string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh globally unique id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Errors turning a property bag back into an object.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The `type` discriminator names a kind this build does not know.
    UnknownType(String),
    /// No `type` field at all.
    MissingType,
    /// Canvas setting key this build does not know.
    UnknownSetting(String),
    /// Known type, but the fields do not fit its schema.
    Malformed(String),
}

impl DecodeError {
    /// Unknown kinds and keys are skipped by readers; anything else is a
    /// broken value.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, DecodeError::UnknownType(_) | DecodeError::UnknownSetting(_))
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(t) => write!(f, "Unknown object type: {t}"),
            Self::MissingType => write!(f, "Missing object type discriminator"),
            Self::UnknownSetting(k) => write!(f, "Unknown canvas setting: {k}"),
            Self::Malformed(e) => write!(f, "Malformed object: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Discriminator values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Rectangle,
    Ellipse,
    Path,
    Text,
    Image,
    Group,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Rectangle => "rectangle",
            ObjectKind::Ellipse => "ellipse",
            ObjectKind::Path => "path",
            ObjectKind::Text => "text",
            ObjectKind::Image => "image",
            ObjectKind::Group => "group",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rectangle" | "rect" => Ok(ObjectKind::Rectangle),
            "ellipse" => Ok(ObjectKind::Ellipse),
            "path" => Ok(ObjectKind::Path),
            "text" | "textbox" => Ok(ObjectKind::Text),
            "image" => Ok(ObjectKind::Image),
            "group" => Ok(ObjectKind::Group),
            other => Err(DecodeError::UnknownType(other.to_string())),
        }
    }
}

/// Fields shared by every object kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BaseProps {
    pub left: f64,
    pub top: f64,
    /// Rotation in degrees, clockwise, about (`left`, `top`).
    pub angle: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub opacity: f64,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub visible: bool,
    pub locked: bool,
}

impl Default for BaseProps {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            angle: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            opacity: 1.0,
            fill: Some("#000000".to_string()),
            stroke: None,
            stroke_width: 1.0,
            visible: true,
            locked: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectangleProps {
    pub width: f64,
    pub height: f64,
    pub rx: f64,
    pub ry: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EllipseProps {
    pub rx: f64,
    pub ry: f64,
}

/// One segment of a path outline, coordinates relative to the object origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum PathCommand {
    #[serde(rename = "M")]
    MoveTo { x: f64, y: f64 },
    #[serde(rename = "L")]
    LineTo { x: f64, y: f64 },
    #[serde(rename = "Q")]
    QuadTo { cx: f64, cy: f64, x: f64, y: f64 },
    #[serde(rename = "C")]
    CubicTo {
        c1x: f64,
        c1y: f64,
        c2x: f64,
        c2y: f64,
        x: f64,
        y: f64,
    },
    #[serde(rename = "Z")]
    Close,
}

impl PathCommand {
    /// Every coordinate the command touches, control points included.
    pub fn points(&self) -> Vec<(f64, f64)> {
        match *self {
            PathCommand::MoveTo { x, y } | PathCommand::LineTo { x, y } => vec![(x, y)],
            PathCommand::QuadTo { cx, cy, x, y } => vec![(cx, cy), (x, y)],
            PathCommand::CubicTo { c1x, c1y, c2x, c2y, x, y } => {
                vec![(c1x, c1y), (c2x, c2y), (x, y)]
            }
            PathCommand::Close => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathProps {
    pub path: Vec<PathCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextProps {
    pub text: String,
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: String,
    pub text_align: String,
    /// Wrapping box width.
    pub width: f64,
    pub line_height: f64,
}

impl Default for TextProps {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_family: "sans-serif".to_string(),
            font_size: 16.0,
            font_weight: "normal".to_string(),
            text_align: "left".to_string(),
            width: 200.0,
            line_height: 1.16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProps {
    pub src: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupProps {
    /// Member ids, in paint order.
    pub objects: Vec<ObjectId>,
    pub width: f64,
    pub height: f64,
}

/// The closed set of drawable kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rectangle(RectangleProps),
    Ellipse(EllipseProps),
    Path(PathProps),
    Text(TextProps),
    Image(ImageProps),
    Group(GroupProps),
}

impl Shape {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Shape::Rectangle(_) => ObjectKind::Rectangle,
            Shape::Ellipse(_) => ObjectKind::Ellipse,
            Shape::Path(_) => ObjectKind::Path,
            Shape::Text(_) => ObjectKind::Text,
            Shape::Image(_) => ObjectKind::Image,
            Shape::Group(_) => ObjectKind::Group,
        }
    }

    fn fields(&self) -> Result<Value, serde_json::Error> {
        match self {
            Shape::Rectangle(p) => serde_json::to_value(p),
            Shape::Ellipse(p) => serde_json::to_value(p),
            Shape::Path(p) => serde_json::to_value(p),
            Shape::Text(p) => serde_json::to_value(p),
            Shape::Image(p) => serde_json::to_value(p),
            Shape::Group(p) => serde_json::to_value(p),
        }
    }

    /// Pick the concrete constructor for `kind`.
    fn from_fields(kind: ObjectKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ObjectKind::Rectangle => Shape::Rectangle(serde_json::from_value(value)?),
            ObjectKind::Ellipse => Shape::Ellipse(serde_json::from_value(value)?),
            ObjectKind::Path => Shape::Path(serde_json::from_value(value)?),
            ObjectKind::Text => Shape::Text(serde_json::from_value(value)?),
            ObjectKind::Image => Shape::Image(serde_json::from_value(value)?),
            ObjectKind::Group => Shape::Group(serde_json::from_value(value)?),
        })
    }
}

/// The replicated portion of an object: everything that crosses the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProps {
    pub base: BaseProps,
    pub shape: Shape,
}

impl ObjectProps {
    pub fn new(shape: Shape) -> Self {
        Self {
            base: BaseProps::default(),
            shape,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.shape.kind()
    }

    /// Flatten into the wire map.
    pub fn to_value(&self) -> Result<Value, DecodeError> {
        let mut map = into_object(serde_json::to_value(&self.base)?)?;
        map.extend(into_object(self.shape.fields()?)?);
        map.insert(
            "type".to_string(),
            Value::String(self.kind().as_str().to_string()),
        );
        Ok(Value::Object(map))
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Rebuild from a wire map, dispatching on the `type` discriminator.
    /// Fields outside the schema are ignored.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let kind = match value.get("type") {
            Some(Value::String(t)) => t.parse::<ObjectKind>()?,
            Some(other) => {
                return Err(DecodeError::Malformed(format!(
                    "type discriminator is not a string: {other}"
                )))
            }
            None => return Err(DecodeError::MissingType),
        };
        let base: BaseProps = serde_json::from_value(value.clone())?;
        let shape = Shape::from_fields(kind, value)?;
        Ok(Self { base, shape })
    }

    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, DecodeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::Malformed(format!("expected a map, got {other}"))),
    }
}

/// Per-client state that never leaves this process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transient {
    pub selected: bool,
    pub hovered: bool,
}

/// A scene object: replicated props plus local-only state.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawableObject {
    id: Option<ObjectId>,
    props: ObjectProps,
    pub transient: Transient,
    geometry: DerivedGeometry,
}

impl DrawableObject {
    /// A new object with no id yet. The id is assigned the first time the
    /// sync layer sees it.
    pub fn new(props: ObjectProps) -> Self {
        let geometry = geometry::compute(&props);
        Self {
            id: None,
            props,
            transient: Transient::default(),
            geometry,
        }
    }

    pub fn with_id(id: impl Into<ObjectId>, props: ObjectProps) -> Self {
        let mut obj = Self::new(props);
        obj.id = Some(id.into());
        obj
    }

    pub fn rectangle(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(ObjectProps {
            base: BaseProps {
                left,
                top,
                ..BaseProps::default()
            },
            shape: Shape::Rectangle(RectangleProps {
                width,
                height,
                ..RectangleProps::default()
            }),
        })
    }

    pub fn ellipse(left: f64, top: f64, rx: f64, ry: f64) -> Self {
        Self::new(ObjectProps {
            base: BaseProps {
                left,
                top,
                ..BaseProps::default()
            },
            shape: Shape::Ellipse(EllipseProps { rx, ry }),
        })
    }

    pub fn text(left: f64, top: f64, text: impl Into<String>) -> Self {
        Self::new(ObjectProps {
            base: BaseProps {
                left,
                top,
                ..BaseProps::default()
            },
            shape: Shape::Text(TextProps {
                text: text.into(),
                ..TextProps::default()
            }),
        })
    }

    pub fn path(left: f64, top: f64, path: Vec<PathCommand>) -> Self {
        Self::new(ObjectProps {
            base: BaseProps {
                left,
                top,
                fill: None,
                stroke: Some("#000000".to_string()),
                ..BaseProps::default()
            },
            shape: Shape::Path(PathProps { path }),
        })
    }

    pub fn image(left: f64, top: f64, src: impl Into<String>, width: f64, height: f64) -> Self {
        Self::new(ObjectProps {
            base: BaseProps {
                left,
                top,
                ..BaseProps::default()
            },
            shape: Shape::Image(ImageProps {
                src: src.into(),
                width,
                height,
            }),
        })
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    /// Give the object an id if it has none. An existing id is never replaced.
    pub fn assign_id(&mut self, id: ObjectId) -> &ObjectId {
        self.id.get_or_insert(id)
    }

    pub fn kind(&self) -> ObjectKind {
        self.props.kind()
    }

    pub fn props(&self) -> &ObjectProps {
        &self.props
    }

    /// Allow-listed copy for the wire.
    pub fn serialize(&self) -> ObjectProps {
        self.props.clone()
    }

    pub fn geometry(&self) -> &DerivedGeometry {
        &self.geometry
    }

    /// Replace the replicated fields, keeping id and transient state.
    /// Geometry is left stale until [`DrawableObject::recompute_geometry`].
    pub(crate) fn patch(&mut self, props: ObjectProps) {
        self.props = props;
    }

    pub(crate) fn props_mut(&mut self) -> &mut ObjectProps {
        &mut self.props
    }

    pub fn recompute_geometry(&mut self) {
        self.geometry = geometry::compute(&self.props);
    }
}
