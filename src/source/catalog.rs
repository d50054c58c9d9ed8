//! Source catalog
//!
//! The catalog validates every declarative and programmatic record, keeps the
//! survivors in an immutable snapshot, and swaps in a fresh snapshot on
//! reload. Readers holding an older snapshot or handle keep a consistent view;
//! handles can tell whether they are still current.

use crate::config::{Config, ProgrammaticRecord, SourceRecord};
use crate::source::descriptor::{OriginKind, SourceDescriptor};
use crate::source::listing::HtmlListingProvider;
use crate::source::provider::{ProviderRegistry, SourceProvider};
use crate::source::validation::validate_record;
use crate::{CatalogError, ValidationError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct SourceError {
    /// The record's id, or a positional placeholder when it has none
    pub source_id: String,
    pub origin: OriginKind,
    pub error: ValidationError,
}

/// Result of a discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub generation: u64,
    pub valid: Vec<Arc<SourceDescriptor>>,
    pub errors: Vec<SourceError>,
}

/// Records the catalog discovers from
#[derive(Debug, Clone, Default)]
pub struct CatalogInputs {
    pub sources: Vec<SourceRecord>,
    pub programmatic: Vec<ProgrammaticRecord>,
}

impl CatalogInputs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sources: config.sources.clone(),
            programmatic: config.programmatic.clone(),
        }
    }
}

struct CatalogEntry {
    descriptor: Arc<SourceDescriptor>,
    provider: Arc<dyn SourceProvider>,
}

/// An immutable view of the catalog at one generation
pub struct CatalogSnapshot {
    generation: u64,
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    errors: Vec<SourceError>,
}

impl CatalogSnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            entries: Vec::new(),
            index: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<SourceDescriptor>> {
        self.index
            .get(id)
            .map(|&i| Arc::clone(&self.entries[i].descriptor))
    }

    /// Descriptors in discovery order
    pub fn descriptors(&self) -> Vec<Arc<SourceDescriptor>> {
        self.entries
            .iter()
            .map(|e| Arc::clone(&e.descriptor))
            .collect()
    }

    pub fn errors(&self) -> &[SourceError] {
        &self.errors
    }
}

impl fmt::Debug for CatalogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSnapshot")
            .field("generation", &self.generation)
            .field("sources", &self.index.keys().collect::<Vec<_>>())
            .field("errors", &self.errors.len())
            .finish()
    }
}

/// A descriptor and its provider, tied to the generation it was taken from
#[derive(Clone)]
pub struct SourceHandle {
    pub descriptor: Arc<SourceDescriptor>,
    pub provider: Arc<dyn SourceProvider>,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SourceHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the catalog has been reloaded
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("id", &self.descriptor.id)
            .field("provider", &self.provider.kind())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Registry of validated sources
pub struct SourceCatalog {
    inputs: RwLock<CatalogInputs>,
    registry: ProviderRegistry,
    current: RwLock<Arc<CatalogSnapshot>>,
    generation: Arc<AtomicU64>,
}

impl SourceCatalog {
    /// Creates an empty catalog; call [`discover`](Self::discover) to load it
    pub fn new(inputs: CatalogInputs, registry: ProviderRegistry) -> Self {
        Self {
            inputs: RwLock::new(inputs),
            registry,
            current: RwLock::new(Arc::new(CatalogSnapshot::empty())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &Config, registry: ProviderRegistry) -> Self {
        Self::new(CatalogInputs::from_config(config), registry)
    }

    /// Validates every record and installs the result as the current snapshot
    ///
    /// Invalid records are reported and excluded; they never abort the pass.
    pub fn discover(&self) -> DiscoveryReport {
        let inputs = self
            .inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let (entries, errors) = self.build_entries(&inputs);
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.descriptor.id.clone(), i))
            .collect();
        let valid: Vec<Arc<SourceDescriptor>> =
            entries.iter().map(|e| Arc::clone(&e.descriptor)).collect();

        let generation = {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let generation = current.generation + 1;
            *current = Arc::new(CatalogSnapshot {
                generation,
                entries,
                index,
                errors: errors.clone(),
            });
            self.generation.store(generation, Ordering::Release);
            generation
        };

        for error in &errors {
            tracing::warn!(
                "Rejected {} source {}: {}",
                error.origin.as_str(),
                error.source_id,
                error.error
            );
        }
        tracing::info!(
            "Catalog generation {}: {} valid sources, {} rejected",
            generation,
            valid.len(),
            errors.len()
        );

        DiscoveryReport {
            generation,
            valid,
            errors,
        }
    }

    /// Re-runs discovery from the current inputs
    ///
    /// Programmatic factories are invoked again, so providers are fresh.
    pub fn reload(&self) -> DiscoveryReport {
        tracing::info!("Reloading source catalog");
        self.discover()
    }

    /// Replaces the inputs with those from `config` and re-runs discovery
    pub fn reload_from(&self, config: &Config) -> DiscoveryReport {
        *self.inputs.write().unwrap_or_else(PoisonError::into_inner) =
            CatalogInputs::from_config(config);
        self.reload()
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Looks up a descriptor by id
    pub fn get(&self, id: &str) -> Result<Arc<SourceDescriptor>, CatalogError> {
        self.snapshot()
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Descriptors whose category matches, case-insensitively
    pub fn by_category(&self, category: &str) -> Vec<Arc<SourceDescriptor>> {
        let category = category.trim().to_lowercase();
        self.snapshot()
            .descriptors()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// All descriptors in discovery order
    pub fn all(&self) -> Vec<Arc<SourceDescriptor>> {
        self.snapshot().descriptors()
    }

    /// Validation errors from the latest discovery pass
    pub fn errors(&self) -> Vec<SourceError> {
        self.snapshot().errors().to_vec()
    }

    /// Returns the descriptor and provider for `id`
    pub fn handle(&self, id: &str) -> Result<SourceHandle, CatalogError> {
        let snapshot = self.snapshot();
        let entry = snapshot
            .index
            .get(id)
            .map(|&i| &snapshot.entries[i])
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        Ok(SourceHandle {
            descriptor: Arc::clone(&entry.descriptor),
            provider: Arc::clone(&entry.provider),
            generation: snapshot.generation,
            current: Arc::clone(&self.generation),
        })
    }

    fn build_entries(&self, inputs: &CatalogInputs) -> (Vec<CatalogEntry>, Vec<SourceError>) {
        let mut entries: Vec<CatalogEntry> = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        let mut admit = |candidate: Result<CatalogEntry, ValidationError>,
                         label: String,
                         origin: OriginKind| {
            let result = candidate.and_then(|entry| {
                if !seen.insert(entry.descriptor.id.clone()) {
                    Err(ValidationError::DuplicateId(entry.descriptor.id.clone()))
                } else {
                    Ok(entry)
                }
            });
            match result {
                Ok(entry) => entries.push(entry),
                Err(error) => errors.push(SourceError {
                    source_id: label,
                    origin,
                    error,
                }),
            }
        };

        for (i, record) in inputs.sources.iter().enumerate() {
            let label = record_label(record, || format!("<source #{}>", i + 1));
            admit(declarative_entry(record), label, OriginKind::Declarative);
        }

        for (i, programmatic) in inputs.programmatic.iter().enumerate() {
            let candidate = self
                .registry
                .instantiate(&programmatic.provider, &programmatic.record);
            let label = match &candidate {
                Ok(instance) => record_label(&instance.record, || {
                    format!("<programmatic #{} ({})>", i + 1, programmatic.provider)
                }),
                Err(_) => record_label(&programmatic.record, || {
                    format!("<programmatic #{} ({})>", i + 1, programmatic.provider)
                }),
            };
            let entry = candidate.and_then(|instance| {
                let descriptor = validate_record(&instance.record, OriginKind::Programmatic)?;
                Ok(CatalogEntry {
                    descriptor: Arc::new(descriptor),
                    provider: instance.provider,
                })
            });
            admit(entry, label, OriginKind::Programmatic);
        }

        (entries, errors)
    }
}

impl fmt::Debug for SourceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCatalog")
            .field("snapshot", &self.snapshot())
            .field("registry", &self.registry)
            .finish()
    }
}

fn declarative_entry(record: &SourceRecord) -> Result<CatalogEntry, ValidationError> {
    let descriptor = validate_record(record, OriginKind::Declarative)?;
    let provider = HtmlListingProvider::from_descriptor(&descriptor)?;
    Ok(CatalogEntry {
        descriptor: Arc::new(descriptor),
        provider: Arc::new(provider),
    })
}

fn record_label(record: &SourceRecord, placeholder: impl FnOnce() -> String) -> String {
    record
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(placeholder)
}
