// ─────────────────────────────────────────────────────────────────────
// SCPN Coulomb Explosion — Coulomb Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Distributed-memory radial N-body solver for Coulomb-explosion dynamics.
//!
//! For a spherically symmetric cloud with non-crossing shells, Gauss's law
//! collapses the pairwise Coulomb sum to E(r) = Q_enc(r)/r², so one time
//! step is: redistribute by radius, prefix-sum charge, evaluate the field
//! pointwise, integrate. Every phase runs bulk-synchronously over a flat
//! communicator of P ranks.

pub mod cloud;
pub mod comm;
pub mod driver;
pub mod energy;
pub mod field;
pub mod metrics;
pub mod output;
pub mod push;
pub mod sort;
