//! Optical physics used by element behaviours.
//!
//! - [`fresnel`] - Fresnel coefficients, Jones matrices and Stokes transfer
//! - [`grating`] - Grating equation, variable line spacing, zone plate line density
//! - [`diffraction`] - Fraunhofer diffraction behind apertures

pub mod diffraction;
pub mod fresnel;
pub mod grating;

/// `h * c` in eV nm.
pub const HC_EV_NM: f64 = 1239.852;

/// Wavelength in nm of a photon of `energy` eV (and vice versa).
///
/// Zero maps to zero instead of infinity.
pub fn hvlam(energy: f64) -> f64 {
    if energy == 0.0 {
        0.0
    } else {
        HC_EV_NM / energy
    }
}
