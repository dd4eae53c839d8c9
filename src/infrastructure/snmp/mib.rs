//! MIB catalog: OID-prefix to symbol resolution.
//!
//! The built-in entries cover the SNMPv2 objects every trap carries;
//! operators extend the catalog with a JSON file mapping dotted OID
//! prefixes to symbols for their devices' MIBs.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

pub struct MibCatalog {
    /// Prefix -> symbol, resolved longest-prefix-first.
    entries: Vec<(Vec<u32>, String)>,
}

impl MibCatalog {
    /// Catalog with the standard SNMPv2 objects preloaded.
    pub fn with_defaults() -> Self {
        let defaults = [
            ("1.3.6.1.2.1.1.1", "sysDescr"),
            ("1.3.6.1.2.1.1.3", "sysUpTime"),
            ("1.3.6.1.2.1.1.5", "sysName"),
            ("1.3.6.1.6.3.1.1.4.1", "snmpTrapOID"),
            ("1.3.6.1.6.3.1.1.4.3", "snmpTrapEnterprise"),
            ("1.3.6.1.6.3.1.1.5.1", "coldStart"),
            ("1.3.6.1.6.3.1.1.5.2", "warmStart"),
            ("1.3.6.1.6.3.1.1.5.3", "linkDown"),
            ("1.3.6.1.6.3.1.1.5.4", "linkUp"),
            ("1.3.6.1.6.3.1.1.5.5", "authenticationFailure"),
            ("1.3.6.1.6.3.18.1.3", "snmpTrapAddress"),
            ("1.3.6.1.6.3.18.1.4", "snmpTrapCommunity"),
            ("1.3.6.1.4.1", "enterprises"),
        ];
        let mut catalog = Self { entries: Vec::new() };
        for (oid, symbol) in defaults {
            catalog.insert(oid, symbol).expect("builtin OID is well-formed");
        }
        catalog
    }

    /// Merge entries from a JSON file of `"dotted.oid": "symbol"` pairs.
    /// Later entries shadow built-ins with the same prefix.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read MIB file {}", path.as_ref().display()))?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&raw).context("MIB file must map dotted OIDs to symbols")?;
        for (oid, symbol) in &entries {
            self.insert(oid, symbol)
                .with_context(|| format!("invalid OID {oid:?} in MIB file"))?;
        }
        Ok(entries.len())
    }

    fn insert(&mut self, dotted: &str, symbol: &str) -> Result<()> {
        let oid = dotted
            .split('.')
            .map(|part| part.parse::<u32>().context("OID arcs must be numeric"))
            .collect::<Result<Vec<u32>>>()?;
        // keep newest entry first among equal-length prefixes
        self.entries.retain(|(existing, _)| existing != &oid);
        self.entries.push((oid, symbol.to_string()));
        self.entries.sort_by_key(|(oid, _)| std::cmp::Reverse(oid.len()));
        Ok(())
    }

    /// Resolve an OID to its symbolic form: the longest known prefix's
    /// symbol plus the remaining arcs, or the dotted numeric form.
    pub fn resolve(&self, oid: &[u32]) -> String {
        for (prefix, symbol) in &self.entries {
            if oid.starts_with(prefix) {
                let rest = &oid[prefix.len()..];
                if rest.is_empty() {
                    return symbol.clone();
                }
                return format!("{symbol}.{}", dotted(rest));
            }
        }
        dotted(oid)
    }
}

fn dotted(oid: &[u32]) -> String {
    oid.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
