//! Audience segmentation over the recipient directory.
//!
//! Evaluation is pure and total. A recipient missing the field a filter looks
//! at is left out of that filter's audience, except for inactivity, where
//! "never checked in" counts as maximally inactive.

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::domain::recipient::Recipient;
use crate::domain::segment::SegmentFilter;

#[derive(Debug, Clone, Serialize)]
pub struct SegmentCount {
    pub filter: SegmentFilter,
    pub label: String,
    pub count: usize,
}

pub struct AudienceSegmenter;

impl AudienceSegmenter {
    pub fn evaluate(filter: &SegmentFilter, recipients: &[Recipient]) -> Vec<Recipient> {
        Self::evaluate_at(filter, recipients, OffsetDateTime::now_utc())
    }

    pub fn evaluate_at(
        filter: &SegmentFilter,
        recipients: &[Recipient],
        now: OffsetDateTime,
    ) -> Vec<Recipient> {
        recipients
            .iter()
            .filter(|recipient| Self::matches(filter, recipient, now))
            .cloned()
            .collect()
    }

    pub fn matches(filter: &SegmentFilter, recipient: &Recipient, now: OffsetDateTime) -> bool {
        match filter {
            SegmentFilter::All => true,
            SegmentFilter::ActiveOnly => recipient
                .subscription_expiry_at
                .is_some_and(|expiry| expiry > now),
            SegmentFilter::ExpiredOnly => recipient
                .subscription_expiry_at
                .is_some_and(|expiry| expiry <= now),
            SegmentFilter::InactivitySince { threshold_days } => match recipient.last_check_at {
                None => true,
                Some(last_check) => now - last_check >= Duration::days(i64::from(*threshold_days)),
            },
            SegmentFilter::ExplicitIdSet { ids } => ids.contains(&recipient.id),
        }
    }

    /// The filters the operator UI offers out of the box.
    pub fn preset_filters() -> Vec<SegmentFilter> {
        vec![
            SegmentFilter::All,
            SegmentFilter::ActiveOnly,
            SegmentFilter::ExpiredOnly,
            SegmentFilter::InactivitySince { threshold_days: 7 },
            SegmentFilter::InactivitySince { threshold_days: 14 },
        ]
    }

    /// Audience size per filter, each filter evaluated on its own.
    pub fn summarize_at(
        filters: &[SegmentFilter],
        recipients: &[Recipient],
        now: OffsetDateTime,
    ) -> Vec<SegmentCount> {
        filters
            .iter()
            .map(|filter| SegmentCount {
                filter: filter.clone(),
                label: filter.label(),
                count: recipients
                    .iter()
                    .filter(|recipient| Self::matches(filter, recipient, now))
                    .count(),
            })
            .collect()
    }
}
