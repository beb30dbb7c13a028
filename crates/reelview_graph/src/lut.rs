// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lookup-table stage shared by the color kinds.
//!
//! Any kind that declares the `lut.*` properties can refresh a [`LutParams`]
//! from them and append its shader op to its own list.

use crate::fingerprint::fingerprint_floats;
use crate::image::{Arg, ShaderOp};
use crate::property::{PropertyContainer, PropertyError, PropertyInfo};

/// Declare `lut.active`, `lut.size` and `lut.lut`
pub fn declare_lut_properties(properties: &mut PropertyContainer) -> Result<(), PropertyError> {
    properties.declare("lut", "active", 0i32)?;
    properties.declare_with_info("lut.size", Vec::<i32>::new(), PropertyInfo::DEFAULT)?;
    properties.declare_with_info("lut.lut", Vec::<[f32; 3]>::new(), PropertyInfo::DEFAULT)?;
    Ok(())
}

/// Typed view of the `lut.*` properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LutParams {
    active: bool,
    dims: Vec<usize>,
    fingerprint: u64,
    valid: bool,
}

impl LutParams {
    /// Read the `lut.*` properties
    pub fn from_properties(properties: &PropertyContainer, node_type: &str) -> Self {
        let active = properties.front_or("lut.active", 0i32) != 0;
        let dims: Vec<usize> = properties
            .get::<i32>("lut.size")
            .unwrap_or_default()
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .collect();
        let table = properties.get::<[f32; 3]>("lut.lut").unwrap_or_default();

        let expected: usize = dims.iter().product();
        let valid = !dims.is_empty() && dims.len() <= 3 && expected > 0 && expected == table.len();
        if active && !valid {
            tracing::warn!(
                "{} LUT has {} entries but size {:?}; LUT ignored",
                node_type,
                table.len(),
                dims
            );
        }

        let flat: Vec<f32> = table.iter().flatten().copied().collect();
        Self {
            active,
            dims,
            fingerprint: fingerprint_floats(&flat),
            valid,
        }
    }

    /// Whether the table will be applied
    pub fn is_applied(&self) -> bool {
        self.active && self.valid
    }

    /// Shader op applying the table, if it is active and well formed
    pub fn shader_op(&self) -> Option<ShaderOp> {
        if !self.is_applied() {
            return None;
        }
        let function = if self.dims.len() == 1 { "lut1d" } else { "lut3d" };
        Some(ShaderOp::new(
            function,
            vec![Arg::Lut {
                dims: self.dims.clone(),
                fingerprint: self.fingerprint,
            }],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lut_properties(active: i32, size: Vec<i32>, table: Vec<[f32; 3]>) -> PropertyContainer {
        let mut props = PropertyContainer::new();
        declare_lut_properties(&mut props).unwrap();
        props.set("lut.active", vec![active]).unwrap();
        props.set("lut.size", size).unwrap();
        props.set("lut.lut", table).unwrap();
        props
    }

    #[test]
    fn test_inactive_lut_has_no_op() {
        let props = lut_properties(0, vec![2], vec![[0.0; 3], [1.0; 3]]);
        assert!(LutParams::from_properties(&props, "Color").shader_op().is_none());
    }

    #[test]
    fn test_1d_lut() {
        let props = lut_properties(1, vec![2], vec![[0.0; 3], [1.0; 3]]);
        let op = LutParams::from_properties(&props, "Color").shader_op().unwrap();
        assert_eq!(op.function, "lut1d");
    }

    #[test]
    fn test_size_mismatch_ignored() {
        let props = lut_properties(1, vec![2, 2, 2], vec![[0.0; 3]; 4]);
        assert!(!LutParams::from_properties(&props, "Color").is_applied());
    }

    #[test]
    fn test_table_content_changes_op() {
        let a = lut_properties(1, vec![2], vec![[0.0; 3], [1.0; 3]]);
        let b = lut_properties(1, vec![2], vec![[0.0; 3], [0.5; 3]]);
        assert_ne!(
            LutParams::from_properties(&a, "Color").shader_op(),
            LutParams::from_properties(&b, "Color").shader_op()
        );
    }
}
