// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Line-oriented input deck for a Coulomb-explosion run.
//!
//! Format: `KEY = value` pairs plus `species <name> <iqom>` lines, `#` for
//! comments, blank lines and stray whitespace tolerated. Unknown keys are
//! ignored so decks stay forward compatible.

use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_SPECIES, DEFAULT_SAVE_INTERVAL};
use crate::error::{ExplosionError, ExplosionResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One particle species: a tag and its inverse charge-over-mass ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub name: String,
    /// Mass/charge ratio; the integrator uses qom = 1/iqom.
    pub iqom: f64,
}

/// Immutable run parameters, fixed after initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Global particle count N (per species).
    pub n_particles: u64,
    /// Initial sphere radius R.
    pub radius: f64,
    /// Time step dt.
    pub dt: f64,
    /// End time t_end.
    pub t_end: f64,
    /// Output cadence in steps.
    pub save_interval: usize,
    /// Cap on the species list.
    pub max_species: usize,
    /// I/O buffer hint in bytes.
    pub buffer_size: usize,
    pub species: Vec<SpeciesSpec>,
}

impl SimulationConfig {
    /// Parse an input deck from a file.
    pub fn from_file(path: &str) -> ExplosionResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExplosionError::ConfigError(format!("cannot read input file {path}: {e}"))
        })?;
        Self::from_str_contents(&contents)
    }

    /// Parse an input deck from its text contents.
    pub fn from_str_contents(text: &str) -> ExplosionResult<Self> {
        let mut n_particles: u64 = 0;
        let mut radius: f64 = 0.0;
        let mut dt: f64 = 0.0;
        let mut t_end: f64 = 0.0;
        let mut save_interval = DEFAULT_SAVE_INTERVAL;
        let mut max_species = DEFAULT_MAX_SPECIES;
        let mut buffer_size = DEFAULT_BUFFER_SIZE;
        let mut species = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let species_rest = line
                .strip_prefix("species")
                .filter(|r| r.starts_with(char::is_whitespace));
            if let Some(rest) = species_rest {
                let mut tokens = rest.split_whitespace();
                let name = tokens.next().ok_or_else(|| {
                    ExplosionError::ConfigError("species line is missing a name".to_string())
                })?;
                let iqom = parse_value::<f64>(tokens.next().unwrap_or(""), "species iqom")?;
                species.push(SpeciesSpec {
                    name: name.to_string(),
                    iqom,
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            // A value may carry a trailing inline comment or units note.
            let value = value.split_whitespace().next().unwrap_or("");
            match key.trim() {
                "N" => n_particles = parse_value(value, "N")?,
                "R" => radius = parse_value(value, "R")?,
                "dt" => dt = parse_value(value, "dt")?,
                "tend" => t_end = parse_value(value, "tend")?,
                "SAVE_INTERVAL" => save_interval = parse_value(value, "SAVE_INTERVAL")?,
                "MAX_SPECIES" => max_species = parse_value(value, "MAX_SPECIES")?,
                "BUFFER_SIZE" => buffer_size = parse_value(value, "BUFFER_SIZE")?,
                _ => {}
            }
        }

        let config = SimulationConfig {
            n_particles,
            radius,
            dt,
            t_end,
            save_interval,
            max_species,
            buffer_size,
            species,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ExplosionResult<()> {
        if self.n_particles == 0 {
            return Err(ExplosionError::ConfigError(
                "N must be present and >= 1".to_string(),
            ));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ExplosionError::ConfigError(
                "R must be present, finite and > 0".to_string(),
            ));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ExplosionError::ConfigError(
                "dt must be present, finite and > 0".to_string(),
            ));
        }
        if !self.t_end.is_finite() || self.t_end <= 0.0 {
            return Err(ExplosionError::ConfigError(
                "tend must be present, finite and > 0".to_string(),
            ));
        }
        if self.save_interval == 0 {
            return Err(ExplosionError::ConfigError(
                "SAVE_INTERVAL must be >= 1".to_string(),
            ));
        }
        if self.species.is_empty() {
            return Err(ExplosionError::ConfigError(
                "at least one species line is required".to_string(),
            ));
        }
        if self.species.len() > self.max_species {
            return Err(ExplosionError::ConfigError(format!(
                "{} species declared but MAX_SPECIES = {}",
                self.species.len(),
                self.max_species
            )));
        }
        for s in &self.species {
            if !s.iqom.is_finite() || s.iqom == 0.0 {
                return Err(ExplosionError::ConfigError(format!(
                    "species {} has invalid iqom {}",
                    s.name, s.iqom
                )));
            }
        }
        Ok(())
    }

    /// Number of time steps, ⌈t_end/dt⌉.
    pub fn step_count(&self) -> usize {
        (self.t_end / self.dt).ceil() as usize
    }

    /// Total charge per species, Q = (4/3)·π·R³.
    pub fn total_charge(&self) -> f64 {
        4.0 / 3.0 * PI * self.radius.powi(3)
    }

    /// Uniform per-particle charge q = Q/N.
    pub fn charge_per_particle(&self) -> f64 {
        self.total_charge() / self.n_particles as f64
    }
}

fn parse_value<T: std::str::FromStr>(token: &str, key: &str) -> ExplosionResult<T> {
    token
        .parse::<T>()
        .map_err(|_| ExplosionError::ConfigError(format!("invalid value {token:?} for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "\
# Coulomb explosion benchmark deck
N = 10000
R = 1.0
dt = 0.001
tend  =  0.1
SAVE_INTERVAL = 10

species electron 1.0
species ion -1836.2
";

    #[test]
    fn test_parse_full_deck() {
        let cfg = SimulationConfig::from_str_contents(DECK).unwrap();
        assert_eq!(cfg.n_particles, 10_000);
        assert!((cfg.radius - 1.0).abs() < 1e-15);
        assert!((cfg.dt - 0.001).abs() < 1e-15);
        assert!((cfg.t_end - 0.1).abs() < 1e-15);
        assert_eq!(cfg.save_interval, 10);
        assert_eq!(cfg.max_species, DEFAULT_MAX_SPECIES);
        assert_eq!(cfg.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(cfg.species.len(), 2);
        assert_eq!(cfg.species[0].name, "electron");
        assert!((cfg.species[1].iqom + 1836.2).abs() < 1e-12);
    }

    #[test]
    fn test_step_count_is_ceiling() {
        let cfg = SimulationConfig::from_str_contents(DECK).unwrap();
        assert_eq!(cfg.step_count(), 100);

        let deck = DECK.replace("tend  =  0.1", "tend = 0.0995");
        let cfg = SimulationConfig::from_str_contents(&deck).unwrap();
        assert_eq!(cfg.step_count(), 100);
    }

    #[test]
    fn test_charge_is_sphere_volume_over_n() {
        let cfg = SimulationConfig::from_str_contents(DECK).unwrap();
        let q_total = 4.0 / 3.0 * PI;
        assert!((cfg.total_charge() - q_total).abs() < 1e-12);
        assert!((cfg.charge_per_particle() - q_total / 10_000.0).abs() < 1e-16);
    }

    #[test]
    fn test_comments_and_inline_notes_ignored() {
        let deck = "\
# header comment
  N = 42
R = 2.0 # sphere radius
dt = 0.5
tend = 1.0
species p 1.0
unknown_key = 7
";
        let cfg = SimulationConfig::from_str_contents(deck).unwrap();
        assert_eq!(cfg.n_particles, 42);
        assert!((cfg.radius - 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_missing_required_parameter_errors() {
        for drop in ["N = 10000", "R = 1.0", "dt = 0.001", "tend  =  0.1"] {
            let deck = DECK.replace(drop, "");
            let err = SimulationConfig::from_str_contents(&deck)
                .expect_err("deck without a required key must fail");
            match err {
                ExplosionError::ConfigError(_) => {}
                other => panic!("Unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_no_species_errors() {
        let deck = "N = 10\nR = 1.0\ndt = 0.1\ntend = 1.0\n";
        assert!(SimulationConfig::from_str_contents(deck).is_err());
    }

    #[test]
    fn test_species_cap_enforced() {
        let mut deck = String::from("N = 10\nR = 1.0\ndt = 0.1\ntend = 1.0\nMAX_SPECIES = 2\n");
        for i in 0..3 {
            deck.push_str(&format!("species s{i} 1.0\n"));
        }
        let err = SimulationConfig::from_str_contents(&deck).unwrap_err();
        match err {
            ExplosionError::ConfigError(msg) => assert!(msg.contains("MAX_SPECIES")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_iqom_rejected() {
        let deck = "N = 10\nR = 1.0\ndt = 0.1\ntend = 1.0\nspecies ghost 0.0\n";
        assert!(SimulationConfig::from_str_contents(deck).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = SimulationConfig::from_str_contents(DECK).unwrap();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.n_particles, cfg2.n_particles);
        assert_eq!(cfg.species, cfg2.species);
        assert!((cfg.dt - cfg2.dt).abs() < 1e-300);
    }
}
