use super::{OutputRecord, instant_within};
use crate::config::QualityInjectionConfig;
use crate::models::{DriverEventRecord, EventType, to_fields};
use crate::quality::{InjectedIssue, IssueType, QualityInjector, RecordKind};
use crate::rng::{DeterministicRng, StreamKind};
use crate::schedule::Interval;

/// Volume parameters for one driver batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventParams {
    pub drivers_per_company: u32,
    /// Poisson mean of events per driver per batch.
    pub event_rate_per_driver: f64,
    /// Cap applied after every draw has been made.
    pub max_events: Option<usize>,
}

/// Output of one driver batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub records: Vec<OutputRecord>,
    /// Records generated past `max_events`, not written.
    pub rejected: Vec<OutputRecord>,
    pub issues: Vec<InjectedIssue>,
    pub seed: u64,
}

#[derive(Debug)]
pub struct DriverEventGenerator<'a> {
    quality: &'a QualityInjectionConfig,
}

impl<'a> DriverEventGenerator<'a> {
    #[must_use]
    pub const fn new(quality: &'a QualityInjectionConfig) -> Self {
        Self { quality }
    }

    /// Generate the events of every (company, driver) pair for `interval`.
    ///
    /// # Pre-conditions
    ///
    /// `eligible_companies` only holds companies created before `interval.start`.
    pub fn generate(&self, eligible_companies: &[String], params: EventParams, interval: Interval, seed: u64) -> EventBatch {
        let mut rng = DeterministicRng::new(seed, StreamKind::DriverEvent);
        let mut injector = QualityInjector::new(self.quality);
        let mut records = Vec::new();
        let mut truck_number: u64 = 0;

        for company_id in eligible_companies {
            for driver_seq in 1..=params.drivers_per_company {
                truck_number += 1;
                let driver_id = format!("DRV-{company_id}-{driver_seq:03}");
                let truck_id = format!("TRK-{seed}-{truck_number:04}");

                for _ in 0..rng.poisson(params.event_rate_per_driver) {
                    let event_type = rng
                        .weighted_index(&EventType::WEIGHTS)
                        .and_then(|index| EventType::ALL.get(index).copied())
                        .unwrap_or(EventType::StartDriving);
                    let event = DriverEventRecord {
                        event_id: rng.uuid().to_string(),
                        driver_id: driver_id.clone(),
                        company_id: company_id.clone(),
                        truck_id: truck_id.clone(),
                        event_type,
                        timestamp: instant_within(&mut rng, interval),
                    };

                    let mut fields = to_fields(&event);
                    let issue = injector.inject(&mut rng, RecordKind::DriverEvent, &mut fields, interval);
                    if issue == Some(IssueType::Duplicate) {
                        records.push(OutputRecord {
                            fields: fields.clone(),
                            issue,
                        });
                    }
                    records.push(OutputRecord { fields, issue });
                }
            }
        }

        let rejected = match params.max_events {
            Some(max) if records.len() > max => records.split_off(max),
            _ => Vec::new(),
        };

        EventBatch {
            records,
            rejected,
            issues: injector.into_issues(),
            seed,
        }
    }
}
