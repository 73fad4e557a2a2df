use std::collections::HashSet;

use tracing::warn;

use super::{DuplicateRecord, OutputRecord, instant_within};
use crate::config::QualityInjectionConfig;
use crate::models::{Company, Geography, to_fields};
use crate::quality::{InjectedIssue, IssueType, QualityInjector, RecordKind};
use crate::rng::{DeterministicRng, StreamKind};
use crate::schedule::Interval;

/// Output of one onboarding batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyBatch {
    /// Rows to append to `companies.jsonl`, in generation order.
    pub records: Vec<OutputRecord>,
    /// Rows dropped by the uniqueness guard.
    pub rejected: Vec<DuplicateRecord>,
    pub issues: Vec<InjectedIssue>,
    pub seed: u64,
}

/// Generates companies while guarding global id uniqueness.
///
/// `known_ids` holds every id already written; ids accepted by `generate` are
/// added to it, so one generator can serve consecutive batches.
#[derive(Debug)]
pub struct CompanyGenerator<'a> {
    quality: &'a QualityInjectionConfig,
    known_ids: HashSet<String>,
}

impl<'a> CompanyGenerator<'a> {
    #[must_use]
    pub const fn new(quality: &'a QualityInjectionConfig, known_ids: HashSet<String>) -> Self {
        Self { quality, known_ids }
    }

    /// Generate `count` companies onboarded inside `window`.
    ///
    /// Colliding ids are logged and discarded, never retried, so a batch may
    /// hold fewer than `count` rows.
    pub fn generate(&mut self, count: u32, seed: u64, window: Interval) -> CompanyBatch {
        let mut rng = DeterministicRng::new(seed, StreamKind::Company);
        let mut injector = QualityInjector::new(self.quality);
        let mut records = Vec::with_capacity(count as usize);
        let mut rejected = Vec::new();

        for _ in 0..count {
            let company = Company {
                company_id: rng.uuid().to_string(),
                geography: Geography::Us,
                active: true,
                created_at: instant_within(&mut rng, window),
            };
            let mut fields = to_fields(&company);
            let issue = injector.inject(&mut rng, RecordKind::Company, &mut fields, window);
            let copies = if issue == Some(IssueType::Duplicate) { 2 } else { 1 };

            for _ in 0..copies {
                let record = OutputRecord {
                    fields: fields.clone(),
                    issue,
                };
                // Rows whose id was nulled by injection cannot collide.
                if let Some(id) = record.field_str("company_id")
                    && !self.known_ids.insert(id.to_string())
                {
                    warn!(company_id = %id, "Duplicate company id, discarding record");
                    rejected.push(DuplicateRecord {
                        company_id: id.to_string(),
                    });
                    continue;
                }
                records.push(record);
            }
        }

        CompanyBatch {
            records,
            rejected,
            issues: injector.into_issues(),
            seed,
        }
    }

    #[must_use]
    pub const fn known_ids(&self) -> &HashSet<String> {
        &self.known_ids
    }
}
