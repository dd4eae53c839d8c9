//! Conflux - monitoring event correlator
//!
//! Ingests events from monitoring tools over HTTP and SNMP, normalizes them
//! against an asset topology held in a document store, and drives each event
//! through a correlation state machine:
//! - dedup of repeated down events
//! - parent/child suppression so only one ticket is raised per incident
//! - delayed ticket creation in an external ITSM
//! - propagated resolution down the parent/child tree

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
