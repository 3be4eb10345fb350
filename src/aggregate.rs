use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::models::{Assessment, CorrectnessRecord, Subject};

pub const NO_DATE_BUCKET: &str = "Sem Data";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub correct: u32,
    pub total: u32,
}

impl Tally {
    pub fn record(self, correct: bool) -> Self {
        Self {
            correct: self.correct + u32::from(correct),
            total: self.total + 1,
        }
    }

    pub fn combine(self, other: Tally) -> Self {
        Self {
            correct: self.correct + other.correct,
            total: self.total + other.total,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.total) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTally {
    pub code: String,
    pub name: String,
    pub subject: Subject,
    pub tally: Tally,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectSplit {
    pub portugues: Tally,
    pub matematica: Tally,
}

impl SubjectSplit {
    pub fn get(&self, subject: Subject) -> Tally {
        match subject {
            Subject::Portugues => self.portugues,
            Subject::Matematica => self.matematica,
        }
    }

    fn slot(&mut self, subject: Subject) -> &mut Tally {
        match subject {
            Subject::Portugues => &mut self.portugues,
            Subject::Matematica => &mut self.matematica,
        }
    }
}

pub fn bucket_key(assessment: &Assessment) -> String {
    assessment
        .application_date
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| NO_DATE_BUCKET.to_string())
}

/// Descriptors and buckets keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub descriptors: IndexMap<String, DescriptorTally>,
    pub buckets: IndexMap<String, SubjectSplit>,
    pub subjects: BTreeMap<Subject, Tally>,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty() && self.buckets.is_empty() && self.subjects.is_empty()
    }

    /// Descriptors in the answer key are reported even when nothing was scored.
    pub fn seed(mut self, assessment: &Assessment) -> Self {
        let Some(key) = assessment.answer_key.as_ref() else {
            return self;
        };
        for descriptor in key.items.iter().filter_map(|item| item.descriptor.as_ref()) {
            self.descriptors
                .entry(descriptor.code.clone())
                .or_insert_with(|| DescriptorTally {
                    code: descriptor.code.clone(),
                    name: descriptor.description.clone(),
                    subject: descriptor.subject,
                    tally: Tally::default(),
                });
        }
        self.buckets.entry(bucket_key(assessment)).or_default();
        self
    }

    pub fn merge(mut self, bucket: &str, record: &CorrectnessRecord) -> Self {
        if let Some(code) = record.descriptor_code.as_ref() {
            let entry = self
                .descriptors
                .entry(code.clone())
                .or_insert_with(|| DescriptorTally {
                    code: code.clone(),
                    name: String::new(),
                    subject: record.subject,
                    tally: Tally::default(),
                });
            entry.tally = entry.tally.record(record.correct);
        }

        let split = self.buckets.entry(bucket.to_string()).or_default();
        let slot = split.slot(record.subject);
        *slot = slot.record(record.correct);

        let subject = self.subjects.entry(record.subject).or_default();
        *subject = subject.record(record.correct);

        self
    }

    pub fn combine(mut self, other: Aggregation) -> Self {
        for (code, incoming) in other.descriptors {
            match self.descriptors.get_mut(&code) {
                Some(existing) => {
                    existing.tally = existing.tally.combine(incoming.tally);
                    if existing.name.is_empty() {
                        existing.name = incoming.name;
                    }
                }
                None => {
                    self.descriptors.insert(code, incoming);
                }
            }
        }
        for (bucket, incoming) in other.buckets {
            let split = self.buckets.entry(bucket).or_default();
            split.portugues = split.portugues.combine(incoming.portugues);
            split.matematica = split.matematica.combine(incoming.matematica);
        }
        for (subject, incoming) in other.subjects {
            let tally = self.subjects.entry(subject).or_default();
            *tally = tally.combine(incoming);
        }
        self
    }
}

pub fn aggregate<'a, I>(scored: I) -> Aggregation
where
    I: IntoIterator<Item = (&'a Assessment, &'a [CorrectnessRecord])>,
{
    scored
        .into_iter()
        .fold(Aggregation::new(), |aggregation, (assessment, records)| {
            let bucket = bucket_key(assessment);
            records
                .iter()
                .fold(aggregation.seed(assessment), |acc, record| {
                    acc.merge(&bucket, record)
                })
        })
}
