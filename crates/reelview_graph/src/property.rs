// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named, typed property containers.
//!
//! Every node owns a [`PropertyContainer`]. Properties are addressed by a
//! qualified `component.name` string and hold a homogeneous array of one
//! element type. Flags in [`PropertyInfo`] tell the graph what a change to the
//! property implies (rebuild a group, flush shaders, skip profiles and so on).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type held by a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// 32-bit signed integers
    Int,
    /// 32-bit floats
    Float,
    /// UTF-8 strings
    String,
    /// Pairs of floats
    Vec2f,
    /// Triples of floats
    Vec3f,
    /// Quadruples of floats
    Vec4f,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Vec2f => "float[2]",
            Self::Vec3f => "float[3]",
            Self::Vec4f => "float[4]",
        };
        f.write_str(name)
    }
}

/// Untyped property payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Integer array
    Int(Vec<i32>),
    /// Float array
    Float(Vec<f32>),
    /// String array
    String(Vec<String>),
    /// Array of 2-vectors
    Vec2f(Vec<[f32; 2]>),
    /// Array of 3-vectors
    Vec3f(Vec<[f32; 3]>),
    /// Array of 4-vectors
    Vec4f(Vec<[f32; 4]>),
}

impl PropertyValue {
    /// An empty array of the given type
    pub fn empty(property_type: PropertyType) -> Self {
        match property_type {
            PropertyType::Int => Self::Int(Vec::new()),
            PropertyType::Float => Self::Float(Vec::new()),
            PropertyType::String => Self::String(Vec::new()),
            PropertyType::Vec2f => Self::Vec2f(Vec::new()),
            PropertyType::Vec3f => Self::Vec3f(Vec::new()),
            PropertyType::Vec4f => Self::Vec4f(Vec::new()),
        }
    }

    /// Element type of this payload
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Int(_) => PropertyType::Int,
            Self::Float(_) => PropertyType::Float,
            Self::String(_) => PropertyType::String,
            Self::Vec2f(_) => PropertyType::Vec2f,
            Self::Vec3f(_) => PropertyType::Vec3f,
            Self::Vec4f(_) => PropertyType::Vec4f,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Vec2f(v) => v.len(),
            Self::Vec3f(v) => v.len(),
            Self::Vec4f(v) => v.len(),
        }
    }

    /// True when the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `len` elements, filling with zero values
    pub fn resize(&mut self, len: usize) {
        match self {
            Self::Int(v) => v.resize(len, 0),
            Self::Float(v) => v.resize(len, 0.0),
            Self::String(v) => v.resize(len, String::new()),
            Self::Vec2f(v) => v.resize(len, [0.0; 2]),
            Self::Vec3f(v) => v.resize(len, [0.0; 3]),
            Self::Vec4f(v) => v.resize(len, [0.0; 4]),
        }
    }

    /// Typed view of the elements
    pub fn as_slice<T: PropertyElement>(&self) -> Option<&[T]> {
        T::slice(self)
    }
}

/// Rust types that can be stored in a property
pub trait PropertyElement: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Property type for this element
    const TYPE: PropertyType;

    /// Wrap a vector of elements
    fn into_value(values: Vec<Self>) -> PropertyValue;

    /// Borrow the elements if the payload has this type
    fn slice(value: &PropertyValue) -> Option<&[Self]>;

    /// Mutably borrow the elements if the payload has this type
    fn vec_mut(value: &mut PropertyValue) -> Option<&mut Vec<Self>>;
}

macro_rules! impl_property_element {
    ($ty:ty, $variant:ident) => {
        impl PropertyElement for $ty {
            const TYPE: PropertyType = PropertyType::$variant;

            fn into_value(values: Vec<Self>) -> PropertyValue {
                PropertyValue::$variant(values)
            }

            fn slice(value: &PropertyValue) -> Option<&[Self]> {
                match value {
                    PropertyValue::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn vec_mut(value: &mut PropertyValue) -> Option<&mut Vec<Self>> {
                match value {
                    PropertyValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_property_element!(i32, Int);
impl_property_element!(f32, Float);
impl_property_element!(String, String);
impl_property_element!([f32; 2], Vec2f);
impl_property_element!([f32; 3], Vec3f);
impl_property_element!([f32; 4], Vec4f);

/// Behavior flags attached to a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Saved with sessions
    pub persistent: bool,
    /// Copied by node copy operations
    pub copyable: bool,
    /// May be driven by animation
    pub animatable: bool,
    /// A change restructures the owning group's subgraph
    pub requires_graph_edit: bool,
    /// A change invalidates compiled shader programs
    pub requires_program_flush: bool,
    /// A change invalidates cached audio
    pub requires_audio_flush: bool,
    /// Written by the node itself, never by users
    pub output_only: bool,
    /// Skipped by profile capture
    pub excluded_from_profile: bool,
}

impl PropertyInfo {
    /// Persistent and copyable, nothing else
    pub const DEFAULT: Self = Self {
        persistent: true,
        copyable: true,
        animatable: false,
        requires_graph_edit: false,
        requires_program_flush: false,
        requires_audio_flush: false,
        output_only: false,
        excluded_from_profile: false,
    };

    /// Mark as restructuring the owning group
    pub const fn graph_edit(mut self) -> Self {
        self.requires_graph_edit = true;
        self
    }

    /// Mark as invalidating shader programs
    pub const fn program_flush(mut self) -> Self {
        self.requires_program_flush = true;
        self
    }

    /// Mark as invalidating audio
    pub const fn audio_flush(mut self) -> Self {
        self.requires_audio_flush = true;
        self
    }

    /// Mark as computed by the node
    pub const fn output_only(mut self) -> Self {
        self.output_only = true;
        self.copyable = false;
        self
    }

    /// Mark as animatable
    pub const fn animatable(mut self) -> Self {
        self.animatable = true;
        self
    }

    /// Keep out of captured profiles
    pub const fn excluded_from_profile(mut self) -> Self {
        self.excluded_from_profile = true;
        self
    }

    /// Neither saved nor copied
    pub const fn transient(mut self) -> Self {
        self.persistent = false;
        self.copyable = false;
        self
    }
}

impl Default for PropertyInfo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A single named property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    name: String,
    value: PropertyValue,
    info: PropertyInfo,
}

impl Property {
    /// Qualified `component.name`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component part of the qualified name
    pub fn component(&self) -> &str {
        self.name.split_once('.').map_or("", |(c, _)| c)
    }

    /// Current payload
    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Behavior flags
    pub fn info(&self) -> PropertyInfo {
        self.info
    }

    /// Element type
    pub fn property_type(&self) -> PropertyType {
        self.value.property_type()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Errors from property access
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// No property with this name
    #[error("Property not found: {0}")]
    NotFound(String),

    /// Property exists with a different element type
    #[error("Property {name} holds {found} values, not {expected}")]
    TypeMismatch {
        /// Qualified name
        name: String,
        /// Type the caller asked for
        expected: PropertyType,
        /// Type actually stored
        found: PropertyType,
    },

    /// Name is not of the form `component.name`
    #[error("Invalid property name: {0:?}")]
    InvalidName(String),

    /// Insertion point beyond the end of the array
    #[error("Index {index} out of range for {name} ({len} elements)")]
    IndexOutOfRange {
        /// Qualified name
        name: String,
        /// Requested index
        index: usize,
        /// Current length
        len: usize,
    },
}

/// Join a component and a property name
pub fn qualified_name(component: &str, name: &str) -> String {
    format!("{component}.{name}")
}

fn validate_name(name: &str) -> Result<(), PropertyError> {
    match name.split_once('.') {
        Some((component, rest)) if !component.is_empty() && !rest.is_empty() => Ok(()),
        _ => Err(PropertyError::InvalidName(name.to_string())),
    }
}

/// Ordered collection of properties keyed by qualified name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyContainer {
    properties: IndexMap<String, Property>,
}

impl PropertyContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a single-element property with default flags.
    ///
    /// Returns the existing property when one of the same type is already
    /// declared; the stored value is left untouched in that case.
    pub fn declare<T: PropertyElement>(
        &mut self,
        component: &str,
        name: &str,
        default: T,
    ) -> Result<&Property, PropertyError> {
        self.declare_with_info(&qualified_name(component, name), vec![default], PropertyInfo::DEFAULT)
    }

    /// Declare a property with explicit default array and flags
    pub fn declare_with_info<T: PropertyElement>(
        &mut self,
        name: &str,
        default: Vec<T>,
        info: PropertyInfo,
    ) -> Result<&Property, PropertyError> {
        self.declare_value(name, T::into_value(default), info)
    }

    /// Declare a property from an untyped default
    pub fn declare_value(
        &mut self,
        name: &str,
        default: PropertyValue,
        info: PropertyInfo,
    ) -> Result<&Property, PropertyError> {
        validate_name(name)?;
        if let Some(existing) = self.properties.get(name) {
            if existing.property_type() != default.property_type() {
                return Err(PropertyError::TypeMismatch {
                    name: name.to_string(),
                    expected: default.property_type(),
                    found: existing.property_type(),
                });
            }
        } else {
            self.properties.insert(
                name.to_string(),
                Property {
                    name: name.to_string(),
                    value: default,
                    info,
                },
            );
        }
        self.properties
            .get(name)
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))
    }

    /// Check whether a property exists
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Look up a property
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Untyped payload of a property
    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    /// Flags of a property
    pub fn info(&self, name: &str) -> Option<PropertyInfo> {
        self.properties.get(name).map(|p| p.info)
    }

    /// Typed elements, `None` if missing or of another type
    pub fn get<T: PropertyElement>(&self, name: &str) -> Option<&[T]> {
        self.value(name).and_then(T::slice)
    }

    /// First element
    pub fn front<T: PropertyElement>(&self, name: &str) -> Option<&T> {
        self.get::<T>(name).and_then(<[T]>::first)
    }

    /// First element, or `default` when missing, empty or mistyped
    pub fn front_or<T: PropertyElement>(&self, name: &str, default: T) -> T {
        self.front::<T>(name).cloned().unwrap_or(default)
    }

    /// Replace the elements of an existing property
    pub fn set<T: PropertyElement>(&mut self, name: &str, values: Vec<T>) -> Result<(), PropertyError> {
        self.set_value(name, T::into_value(values))
    }

    /// Replace the payload of an existing property; the type must match
    pub fn set_value(&mut self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))?;
        if property.property_type() != value.property_type() {
            return Err(PropertyError::TypeMismatch {
                name: name.to_string(),
                expected: value.property_type(),
                found: property.property_type(),
            });
        }
        property.value = value;
        Ok(())
    }

    /// Resize an existing property
    pub fn resize(&mut self, name: &str, len: usize) -> Result<(), PropertyError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))?;
        property.value.resize(len);
        Ok(())
    }

    /// Insert elements at `index`
    pub fn insert_values<T: PropertyElement>(
        &mut self,
        name: &str,
        index: usize,
        values: Vec<T>,
    ) -> Result<(), PropertyError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| PropertyError::NotFound(name.to_string()))?;
        let found = property.property_type();
        let elements = T::vec_mut(&mut property.value).ok_or_else(|| PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: T::TYPE,
            found,
        })?;
        if index > elements.len() {
            return Err(PropertyError::IndexOutOfRange {
                name: name.to_string(),
                index,
                len: elements.len(),
            });
        }
        elements.splice(index..index, values);
        Ok(())
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.properties.shift_remove(name)
    }

    /// Qualified names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// All properties in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Properties belonging to one component
    pub fn component<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties.values().filter(move |p| p.component() == component)
    }

    /// Copy every copyable property of `other` that also exists here with the
    /// same type. Returns the names whose value changed.
    pub fn copy_from(&mut self, other: &PropertyContainer) -> Vec<String> {
        let mut changed = Vec::new();
        for source in other.iter().filter(|p| p.info.copyable) {
            if let Some(target) = self.properties.get_mut(source.name()) {
                if target.info.copyable
                    && target.property_type() == source.property_type()
                    && target.value != source.value
                {
                    target.value = source.value.clone();
                    changed.push(source.name.clone());
                }
            }
        }
        changed
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True when no properties are declared
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
