//! Merge engine: two taxonomy feeds in, one canonical record set out.
//!
//! Sections are keyed by their normalized URL segment, microsites by the
//! `(section, microsite)` pair, so a key can never appear twice. The
//! publisher feed is authoritative: a show-config entry for an existing key
//! only fills empty fields, while a repeated observation from the same
//! source refreshes the title. Keys only show-config knows about are
//! admitted as show-config sourced records.
//!
//! Output order is unspecified; callers sort by [`CanonicalRecord::key`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::{debug, info, trace, warn};

use sitemap_shared::{CanonicalRecord, EntryKind, Source, TaxonomyEntry, normalize_segment};

/// Merge the category feed and the show-config feed.
///
/// The homepage sentinel is always the first record.
pub fn merge(
    category_entries: impl IntoIterator<Item = TaxonomyEntry>,
    showconfig_entries: impl IntoIterator<Item = TaxonomyEntry>,
) -> Vec<CanonicalRecord> {
    let mut merger = Merger::default();
    for entry in category_entries {
        merger.observe(entry);
    }
    for entry in showconfig_entries {
        merger.observe(entry);
    }
    merger.finish()
}

/// Incremental merge state.
#[derive(Debug, Default)]
pub struct Merger {
    sections: HashMap<String, CanonicalRecord>,
    microsites: HashMap<(String, String), CanonicalRecord>,
}

impl Merger {
    /// Fold one entry into the state.
    pub fn observe(&mut self, entry: TaxonomyEntry) {
        let segment = normalize_segment(&entry.url_segment);
        if segment.is_empty() {
            trace!(name = %entry.name, "empty path, folded into homepage");
            return;
        }

        match entry.kind {
            EntryKind::Section => {
                let record = to_record(&entry, segment.clone(), String::new());
                match self.sections.entry(segment) {
                    Entry::Vacant(slot) => {
                        trace!(section = %record.section_url, source = ?record.source, "section");
                        slot.insert(record);
                    }
                    Entry::Occupied(mut slot) => {
                        trace!(section = %record.section_url, source = ?record.source, "section +");
                        reconcile(slot.get_mut(), record);
                    }
                }
            }
            EntryKind::Microsite => {
                let Some(section) = entry
                    .section
                    .as_deref()
                    .map(normalize_segment)
                    .filter(|s| !s.is_empty())
                else {
                    debug!(microsite = %segment, "microsite without a section, dropping");
                    return;
                };

                let record = to_record(&entry, section.clone(), segment.clone());
                match self.microsites.entry((section, segment)) {
                    Entry::Vacant(slot) => {
                        trace!(cname = %record.content_name, "microsite");
                        slot.insert(record);
                    }
                    Entry::Occupied(mut slot) => {
                        trace!(cname = %record.content_name, "microsite +");
                        reconcile(slot.get_mut(), record);
                    }
                }
            }
        }
    }

    /// Produce the canonical record set: homepage, sections, then every
    /// microsite whose section is known. Orphans are dropped.
    pub fn finish(self) -> Vec<CanonicalRecord> {
        let mut records = Vec::with_capacity(1 + self.sections.len() + self.microsites.len());
        records.push(CanonicalRecord::homepage());

        let section_count = self.sections.len();
        let mut orphans = 0usize;

        for ((section, _), record) in self.microsites {
            if self.sections.contains_key(&section) {
                records.push(record);
            } else {
                warn!(section = %section, microsite = %record.microsite_url, "orphaned microsite dropped");
                orphans += 1;
            }
        }
        records.extend(self.sections.into_values());

        info!(
            records = records.len(),
            sections = section_count,
            orphans,
            "records"
        );
        records
    }
}

fn to_record(entry: &TaxonomyEntry, section_url: String, microsite_url: String) -> CanonicalRecord {
    CanonicalRecord {
        title: entry.name.trim().to_string(),
        content_name: entry.category_key.clone(),
        template: entry.template.clone(),
        section_url,
        microsite_url,
        source: Some(entry.source),
    }
}

/// Apply a later observation of an existing key.
fn reconcile(existing: &mut CanonicalRecord, incoming: CanonicalRecord) {
    match (existing.source, incoming.source) {
        // Same source seen again: mutable fields follow the latest observation.
        (a, b) if a == b => {
            if !incoming.title.is_empty() {
                existing.title = incoming.title;
            }
            if incoming.template.is_some() {
                existing.template = incoming.template;
            }
        }
        // A provisional show-config record is superseded by the publisher.
        (Some(Source::ShowConfig), Some(Source::Publisher)) => {
            existing.title = incoming.title;
            existing.content_name = incoming.content_name;
            existing.source = incoming.source;
            if incoming.template.is_some() {
                existing.template = incoming.template;
            }
        }
        // Lower-confidence source: fill gaps only.
        _ => {
            if existing.title.is_empty() {
                existing.title = incoming.title;
            }
            if existing.content_name.is_empty() {
                existing.content_name = incoming.content_name;
            }
            if existing.template.is_none() {
                existing.template = incoming.template;
            }
        }
    }
}
