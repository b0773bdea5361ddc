//! Decoration values: a range or point in the document plus what to do with it.
//!
//! A [`Decoration`] is immutable. Its positions are relative to whatever holds it:
//! inside a [`DecorationSet`](crate::DecorationSet) node they are relative to the
//! node's start, and every decoration handed back to callers has been moved to
//! absolute document positions.
//!
//! # Payloads
//!
//! The [`Payload`] is a closed set of variants:
//!
//! - **Widget**: an opaque renderable unit. On a range it replaces the range's content
//!   (a *collapsed* range), on a point it is an inline widget.
//! - **Attributes**: presentation attributes (`class`, `style`, ...) merged by
//!   [`decorated_spans_in_range`](crate::decorated_spans_in_range).
//! - **Metadata**: an application value the engine carries without looking at it.
//!
//! # Boundary behavior
//!
//! When a set is mapped through edits, range endpoints are moved according to the
//! inclusivity flags, and points according to their [`Bias`]:
//!
//! ```text
//! insert "xy" at 1, decoration [1, 2):
//!   exclusive start      [3, 4)     inserted text stays outside
//!   inclusive start      [1, 4)     inserted text is absorbed
//! ```

use crate::{change::ChangeSet, error::InvalidRangeSnafu, error::Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

/// Which side of an insertion at its exact position a point sticks to.
///
/// `Left` (assoc -1) keeps the point before inserted content and ties it to the
/// content on its left; `Right` (assoc +1) moves it after the inserted content.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Bias {
    #[default]
    Left,
    Right,
}

/// A renderable unit carried by widget decorations.
///
/// The engine never renders widgets. [`compare`](WidgetType::compare) lets a view
/// keep existing output when a rebuilt decoration carries an equivalent widget.
pub trait WidgetType: fmt::Debug + Send + Sync + 'static {
    /// Whether `other` renders identically to `self`.
    fn compare(&self, _other: &dyn WidgetType) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a [`WidgetType`].
#[derive(Clone, Debug)]
pub struct Widget(Arc<dyn WidgetType>);

impl Widget {
    pub fn new(widget: impl WidgetType) -> Self {
        Self(Arc::new(widget))
    }

    pub fn get(&self) -> &dyn WidgetType {
        self.0.as_ref()
    }

    pub fn downcast_ref<T: WidgetType>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    /// Same widget object, or widgets that [`compare`](WidgetType::compare) equal.
    pub fn same(&self, other: &Widget) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.compare(other.0.as_ref())
    }
}

/// Presentation attributes, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<CompactString, CompactString>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn class(class: impl Into<CompactString>) -> Self {
        Self::new().with("class", class)
    }

    pub fn style(style: impl Into<CompactString>) -> Self {
        Self::new().with("style", style)
    }

    pub fn insert(&mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(CompactString::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(CompactString::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold `other` into `self`: `class` values join with a space, `style` values
    /// with `;`, anything else is overwritten by `other`.
    pub fn merge(&mut self, other: &Attributes) {
        for (key, value) in &other.0 {
            let separator = match key.as_str() {
                "class" => Some(' '),
                "style" => Some(';'),
                _ => None,
            };
            if let (Some(separator), Some(existing)) = (separator, self.0.get_mut(key)) {
                existing.push(separator);
                existing.push_str(value);
                continue;
            }
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<CompactString>,
    V: Into<CompactString>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Application data carried opaquely by a decoration.
#[derive(Clone)]
pub struct Metadata(Arc<dyn Any + Send + Sync>);

impl Metadata {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Metadata(..)")
    }
}

/// What a decoration does.
#[derive(Clone, Debug)]
pub enum Payload {
    Widget(Widget),
    Attributes(Attributes),
    Metadata(Metadata),
}

/// Everything about a decoration except its position.
#[derive(Clone, Debug)]
pub struct DecorationSpec {
    pub payload: Payload,
    /// Insertions at the start are absorbed into the range.
    pub inclusive_start: bool,
    /// Insertions at the end are absorbed into the range.
    pub inclusive_end: bool,
    /// Side a point sticks to. Ignored for ranges.
    pub bias: Bias,
}

impl DecorationSpec {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            inclusive_start: false,
            inclusive_end: false,
            bias: Bias::Left,
        }
    }

    /// A spec without presentation attributes or widget.
    pub fn none() -> Self {
        Self::attributes(Attributes::new())
    }

    pub fn attributes(attributes: Attributes) -> Self {
        Self::new(Payload::Attributes(attributes))
    }

    pub fn class(class: impl Into<CompactString>) -> Self {
        Self::attributes(Attributes::class(class))
    }

    pub fn widget(widget: Widget) -> Self {
        Self::new(Payload::Widget(widget))
    }

    pub fn metadata<T: Any + Send + Sync>(value: T) -> Self {
        Self::new(Payload::Metadata(Metadata::new(value)))
    }

    pub fn inclusive(self, inclusive: bool) -> Self {
        self.inclusive_start(inclusive).inclusive_end(inclusive)
    }

    pub fn inclusive_start(mut self, inclusive: bool) -> Self {
        self.inclusive_start = inclusive;
        self
    }

    pub fn inclusive_end(mut self, inclusive: bool) -> Self {
        self.inclusive_end = inclusive;
        self
    }

    pub fn bias(mut self, bias: Bias) -> Self {
        self.bias = bias;
        self
    }
}

/// A range `[from, to)` or point (`from == to`) with a shared [`DecorationSpec`].
#[derive(Clone, Debug)]
pub struct Decoration {
    from: usize,
    to: usize,
    spec: Arc<DecorationSpec>,
}

impl Decoration {
    /// Create a decoration covering `[from, to)`.
    ///
    /// Fails with [`InvalidRange`](crate::DecorationError::InvalidRange) when
    /// `to < from`.
    pub fn range(from: usize, to: usize, spec: DecorationSpec) -> Result<Self> {
        ensure!(from <= to, InvalidRangeSnafu { from, to });
        Ok(Self {
            from,
            to,
            spec: Arc::new(spec),
        })
    }

    pub fn point(pos: usize, spec: DecorationSpec) -> Self {
        Self {
            from: pos,
            to: pos,
            spec: Arc::new(spec),
        }
    }

    /// An inline widget at `pos`.
    pub fn widget(pos: usize, widget: Widget) -> Self {
        Self::point(pos, DecorationSpec::widget(widget))
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn is_point(&self) -> bool {
        self.from == self.to
    }

    pub fn spec(&self) -> &DecorationSpec {
        &self.spec
    }

    pub fn payload(&self) -> &Payload {
        &self.spec.payload
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match &self.spec.payload {
            Payload::Attributes(attributes) => Some(attributes),
            _ => None,
        }
    }

    pub fn widget_ref(&self) -> Option<&Widget> {
        match &self.spec.payload {
            Payload::Widget(widget) => Some(widget),
            _ => None,
        }
    }

    pub fn metadata<T: Any>(&self) -> Option<&T> {
        match &self.spec.payload {
            Payload::Metadata(metadata) => metadata.downcast_ref(),
            _ => None,
        }
    }

    /// A range whose content a widget replaces.
    pub fn is_collapsed(&self) -> bool {
        !self.is_point() && matches!(self.spec.payload, Payload::Widget(_))
    }

    /// Whether this decoration introduces span boundaries.
    pub(crate) fn has_attributes(&self) -> bool {
        self.attributes().is_some_and(|attributes| !attributes.is_empty())
    }

    pub(crate) fn sort_key(&self) -> (usize, usize) {
        (self.from, self.to)
    }

    /// Same spec at `[from, to)`, without validation.
    pub(crate) fn with_range(&self, from: usize, to: usize) -> Self {
        debug_assert!(from <= to);
        Self {
            from,
            to,
            spec: Arc::clone(&self.spec),
        }
    }

    /// Shift forward by `offset`.
    pub(crate) fn shifted(&self, offset: usize) -> Self {
        self.with_range(self.from + offset, self.to + offset)
    }

    /// Shift back by `offset`, which must not exceed `from`.
    pub(crate) fn unshifted(&self, offset: usize) -> Self {
        self.with_range(self.from - offset, self.to - offset)
    }

    /// Map through `changes`, with positions interpreted relative to `offset` in the
    /// old document. Returns absolute new positions, or `None` when the decoration
    /// does not survive the edit.
    pub(crate) fn map(&self, changes: &ChangeSet, offset: usize) -> Option<(usize, usize)> {
        let from = self.from + offset;
        let to = self.to + offset;

        if self.is_point() {
            let pos = changes.map_point(from, self.spec.bias)?;
            return Some((pos, pos));
        }

        let start_bias = if self.spec.inclusive_start {
            Bias::Left
        } else {
            Bias::Right
        };
        let end_bias = if self.spec.inclusive_end {
            Bias::Right
        } else {
            Bias::Left
        };
        let new_from = changes.map_pos(from, start_bias);
        let new_to = changes.map_pos(to, end_bias);
        (new_from < new_to).then_some((new_from, new_to))
    }
}
