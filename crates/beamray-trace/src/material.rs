//! Refractive-index tables.
//!
//! Materials are stored as two flat arrays so they can be uploaded to a
//! device unchanged: `material_table` holds `(energy, n, k)` rows sorted by
//! energy, and `index_table[m]..index_table[m + 1]` is the row range of
//! material `m`.

use beamray_math::Complex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Surface material of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    /// Ideal reflector; leaves intensity and polarization unchanged.
    #[default]
    Perfect,
    /// Material `id` of the [`MaterialTables`].
    Table(u32),
}

/// Errors in the shape of material tables.
#[derive(Debug, Error, PartialEq)]
pub enum MaterialError {
    /// `material_table` length is not a multiple of three.
    #[error("material table has {0} values, not a whole number of (energy, n, k) rows")]
    RaggedTable(usize),

    /// `index_table` decreases or does not start at zero.
    #[error("material index table is not a non-decreasing sequence starting at 0")]
    BadIndex,

    /// `index_table` does not end at the number of rows.
    #[error("material index table ends at row {last}, table has {rows} rows")]
    IndexMismatch {
        /// Final index entry.
        last: u32,
        /// Rows in the table.
        rows: usize,
    },

    /// Energies of a material are not sorted.
    #[error("energies of material {0} are not sorted")]
    UnsortedEnergies(usize),
}

/// Flat refractive-index tables shared by all elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialTables {
    /// Row offsets, one more entry than there are materials.
    pub index_table: Vec<u32>,
    /// `(energy eV, n, k)` rows, three values each.
    pub material_table: Vec<f64>,
}

impl MaterialTables {
    /// Build tables from per-material row lists.
    pub fn from_materials(materials: &[Vec<[f64; 3]>]) -> Self {
        let mut index_table = Vec::with_capacity(materials.len() + 1);
        let mut material_table = Vec::new();
        index_table.push(0);
        for rows in materials {
            material_table.extend(rows.iter().flatten());
            index_table.push((material_table.len() / 3) as u32);
        }
        Self {
            index_table,
            material_table,
        }
    }

    /// Number of materials described.
    pub fn material_count(&self) -> usize {
        self.index_table.len().saturating_sub(1)
    }

    /// Check the table shape.
    pub fn validate(&self) -> Result<(), MaterialError> {
        if self.material_table.len() % 3 != 0 {
            return Err(MaterialError::RaggedTable(self.material_table.len()));
        }
        let rows = self.material_table.len() / 3;
        if self.index_table.is_empty() {
            return if rows == 0 {
                Ok(())
            } else {
                Err(MaterialError::IndexMismatch { last: 0, rows })
            };
        }
        if self.index_table[0] != 0 || self.index_table.windows(2).any(|w| w[0] > w[1]) {
            return Err(MaterialError::BadIndex);
        }
        let last = self.index_table[self.index_table.len() - 1];
        if last as usize != rows {
            return Err(MaterialError::IndexMismatch { last, rows });
        }
        for material in 0..self.material_count() {
            let energies: Vec<f64> = self.rows(material).map(|r| r[0]).collect();
            if energies.windows(2).any(|w| w[0] > w[1]) {
                return Err(MaterialError::UnsortedEnergies(material));
            }
        }
        Ok(())
    }

    fn rows(&self, material: usize) -> impl Iterator<Item = &[f64]> {
        let start = self.index_table[material] as usize * 3;
        let end = self.index_table[material + 1] as usize * 3;
        self.material_table[start..end].chunks_exact(3)
    }

    /// Complex refractive index `n + ik` of `material` at `energy` eV.
    ///
    /// Linear interpolation between rows, clamped to the first and last row.
    /// Returns `None` for an unknown material or one without rows.
    pub fn refractive_index(&self, material: u32, energy: f64) -> Option<Complex> {
        let material = material as usize;
        if material >= self.material_count() {
            return None;
        }
        let start = self.index_table[material] as usize * 3;
        let end = self.index_table[material + 1] as usize * 3;
        let rows = self.material_table.get(start..end)?;
        let count = rows.len() / 3;
        if count == 0 {
            return None;
        }

        let row = |i: usize| (rows[3 * i], rows[3 * i + 1], rows[3 * i + 2]);

        let first = row(0);
        if energy <= first.0 || count == 1 {
            return Some(Complex::new(first.1, first.2));
        }
        let last = row(count - 1);
        if energy >= last.0 {
            return Some(Complex::new(last.1, last.2));
        }

        // Bisect for the bracketing rows; row(lo).0 < energy < row(hi).0.
        let (mut lo, mut hi) = (0, count - 1);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if row(mid).0 <= energy {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let (e0, n0, k0) = row(lo);
        let (e1, n1, k1) = row(hi);
        let span = e1 - e0;
        let w = if span > 0.0 { (energy - e0) / span } else { 0.0 };
        Some(Complex::new(n0 + w * (n1 - n0), k0 + w * (k1 - k0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_like() -> MaterialTables {
        MaterialTables::from_materials(&[
            vec![[10.0, 0.9, 0.1], [20.0, 0.8, 0.3], [40.0, 0.7, 0.2]],
            vec![[100.0, 0.99, 0.01]],
        ])
    }

    #[test]
    fn test_from_materials_layout() {
        let tables = gold_like();
        assert_eq!(tables.index_table, vec![0, 3, 4]);
        assert_eq!(tables.material_table.len(), 12);
        assert_eq!(tables.material_count(), 2);
        assert!(tables.validate().is_ok());
    }

    #[test]
    fn test_interpolates_between_rows() {
        let tables = gold_like();
        let n = tables.refractive_index(0, 15.0).unwrap();
        assert!((n.re - 0.85).abs() < 1e-12);
        assert!((n.im - 0.2).abs() < 1e-12);

        let n = tables.refractive_index(0, 20.0).unwrap();
        assert!((n.re - 0.8).abs() < 1e-12);
        assert!((n.im - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_clamps_outside_range() {
        let tables = gold_like();
        assert_eq!(tables.refractive_index(0, 1.0), Some(Complex::new(0.9, 0.1)));
        assert_eq!(tables.refractive_index(0, 1e6), Some(Complex::new(0.7, 0.2)));
        assert_eq!(tables.refractive_index(1, 5.0), Some(Complex::new(0.99, 0.01)));
    }

    #[test]
    fn test_unknown_material() {
        let tables = gold_like();
        assert_eq!(tables.refractive_index(2, 15.0), None);
        assert_eq!(MaterialTables::default().refractive_index(0, 15.0), None);
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let ragged = MaterialTables {
            index_table: vec![0, 1],
            material_table: vec![1.0, 2.0],
        };
        assert_eq!(ragged.validate(), Err(MaterialError::RaggedTable(2)));

        let mismatch = MaterialTables {
            index_table: vec![0, 2],
            material_table: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(
            mismatch.validate(),
            Err(MaterialError::IndexMismatch { last: 2, rows: 1 })
        );

        let decreasing = MaterialTables {
            index_table: vec![0, 1, 0],
            material_table: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(decreasing.validate(), Err(MaterialError::BadIndex));

        let unsorted = MaterialTables::from_materials(&[vec![[20.0, 1.0, 0.0], [10.0, 1.0, 0.0]]]);
        assert_eq!(unsorted.validate(), Err(MaterialError::UnsortedEnergies(0)));
    }
}
