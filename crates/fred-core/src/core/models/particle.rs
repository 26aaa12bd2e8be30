use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Proton rest energy in MeV.
pub const PROTON_MASS_MEV: f64 = 938.272;
/// Atomic mass unit in MeV.
pub const AMU_MEV: f64 = 931.494;
pub const ELECTRON_MASS_MEV: f64 = 0.511;
pub const NEUTRON_MASS_MEV: f64 = 939.565;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParticleError {
    #[error("Unknown particle name: '{0}'")]
    UnknownName(String),
    #[error("Unknown particle code: {0}")]
    UnknownCode(i32),
}

/// How the tracking engine transports a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportClass {
    /// Straight-line geometric probe; scores track length only.
    Geometric,
    /// Protons and ions: full condensed-history transport.
    ChargedHadron,
    /// Electrons and positrons deposit their energy on the spot.
    LocalDeposit,
    /// Neutral particles fly straight out of the scene.
    Neutral,
}

/// Particle species supported by the ray store, identified by PDG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Particle {
    GeoRay,
    Photon,
    Electron,
    Positron,
    Neutron,
    Proton,
    Deuteron,
    Triton,
    Helium3,
    Alpha,
    Lithium7,
    Carbon12,
    Oxygen16,
}

impl Particle {
    pub const ALL: [Particle; 13] = [
        Particle::GeoRay,
        Particle::Photon,
        Particle::Electron,
        Particle::Positron,
        Particle::Neutron,
        Particle::Proton,
        Particle::Deuteron,
        Particle::Triton,
        Particle::Helium3,
        Particle::Alpha,
        Particle::Lithium7,
        Particle::Carbon12,
        Particle::Oxygen16,
    ];

    /// PDG Monte-Carlo numbering scheme code; the geometric ray uses 0.
    pub fn pdg_code(self) -> i32 {
        match self {
            Particle::GeoRay => 0,
            Particle::Photon => 22,
            Particle::Electron => 11,
            Particle::Positron => -11,
            Particle::Neutron => 2112,
            Particle::Proton => 2212,
            Particle::Deuteron => 1000010020,
            Particle::Triton => 1000010030,
            Particle::Helium3 => 1000020030,
            Particle::Alpha => 1000020040,
            Particle::Lithium7 => 1000030070,
            Particle::Carbon12 => 1000060120,
            Particle::Oxygen16 => 1000080160,
        }
    }

    pub fn from_pdg_code(code: i32) -> Result<Self, ParticleError> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.pdg_code() == code)
            .ok_or(ParticleError::UnknownCode(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            Particle::GeoRay => "GEORAY",
            Particle::Photon => "PHOTON",
            Particle::Electron => "ELECTRON",
            Particle::Positron => "POSITRON",
            Particle::Neutron => "NEUTRON",
            Particle::Proton => "PROTON",
            Particle::Deuteron => "DEUTERON",
            Particle::Triton => "TRITON",
            Particle::Helium3 => "HE3",
            Particle::Alpha => "ALPHA",
            Particle::Lithium7 => "LI7",
            Particle::Carbon12 => "C12",
            Particle::Oxygen16 => "O16",
        }
    }

    /// Charge number.
    pub fn charge(self) -> i32 {
        match self {
            Particle::GeoRay | Particle::Photon | Particle::Neutron => 0,
            Particle::Electron => -1,
            Particle::Positron | Particle::Proton | Particle::Deuteron | Particle::Triton => 1,
            Particle::Helium3 | Particle::Alpha => 2,
            Particle::Lithium7 => 3,
            Particle::Carbon12 => 6,
            Particle::Oxygen16 => 8,
        }
    }

    /// Nucleon number (0 for leptons, photons and geometric rays).
    pub fn mass_number(self) -> u32 {
        match self {
            Particle::GeoRay | Particle::Photon | Particle::Electron | Particle::Positron => 0,
            Particle::Neutron | Particle::Proton => 1,
            Particle::Deuteron => 2,
            Particle::Triton | Particle::Helium3 => 3,
            Particle::Alpha => 4,
            Particle::Lithium7 => 7,
            Particle::Carbon12 => 12,
            Particle::Oxygen16 => 16,
        }
    }

    /// Rest energy in MeV.
    pub fn mass(self) -> f64 {
        match self {
            Particle::GeoRay | Particle::Photon => 0.0,
            Particle::Electron | Particle::Positron => ELECTRON_MASS_MEV,
            Particle::Neutron => NEUTRON_MASS_MEV,
            Particle::Proton => PROTON_MASS_MEV,
            other => other.mass_number() as f64 * AMU_MEV,
        }
    }

    pub fn transport_class(self) -> TransportClass {
        match self {
            Particle::GeoRay => TransportClass::Geometric,
            Particle::Electron | Particle::Positron => TransportClass::LocalDeposit,
            Particle::Photon | Particle::Neutron => TransportClass::Neutral,
            _ => TransportClass::ChargedHadron,
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Particle {
    type Err = ParticleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let alias = match upper.as_str() {
            "P" | "H1" => "PROTON",
            "N" => "NEUTRON",
            "E-" => "ELECTRON",
            "E+" => "POSITRON",
            "GAMMA" => "PHOTON",
            "D" | "H2" => "DEUTERON",
            "T" | "H3" => "TRITON",
            "HE4" => "ALPHA",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == alias)
            .ok_or_else(|| ParticleError::UnknownName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("proton".parse::<Particle>().unwrap(), Particle::Proton);
        assert_eq!("PROTON".parse::<Particle>().unwrap(), Particle::Proton);
        assert_eq!("c12".parse::<Particle>().unwrap(), Particle::Carbon12);
        assert_eq!("GeoRay".parse::<Particle>().unwrap(), Particle::GeoRay);
        assert_eq!("he4".parse::<Particle>().unwrap(), Particle::Alpha);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "muon".parse::<Particle>(),
            Err(ParticleError::UnknownName("muon".to_string()))
        );
    }

    #[test]
    fn pdg_codes_round_trip_for_every_species() {
        for p in Particle::ALL {
            assert_eq!(Particle::from_pdg_code(p.pdg_code()).unwrap(), p);
        }
        assert_eq!(
            Particle::from_pdg_code(13),
            Err(ParticleError::UnknownCode(13))
        );
    }

    #[test]
    fn ions_are_charged_hadrons_with_nucleon_masses() {
        assert_eq!(Particle::Carbon12.transport_class(), TransportClass::ChargedHadron);
        assert_eq!(Particle::Carbon12.charge(), 6);
        assert!((Particle::Carbon12.mass() - 12.0 * AMU_MEV).abs() < 1e-9);
        assert_eq!(Particle::GeoRay.transport_class(), TransportClass::Geometric);
        assert_eq!(Particle::Neutron.transport_class(), TransportClass::Neutral);
    }
}
