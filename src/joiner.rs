use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::models::{AnswerKeyItem, Assessment, CorrectnessRecord, StudentResponse, Subject};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    pub records: Vec<CorrectnessRecord>,
    pub orphaned_items: usize,
    pub missing_key: bool,
}

pub fn classify(item: &AnswerKeyItem, assessment: &Assessment) -> Subject {
    item.descriptor
        .as_ref()
        .map_or(assessment.subject, |descriptor| descriptor.subject)
}

/// A key question the student did not answer is scored as incorrect.
/// Comparison is exact and case-sensitive.
pub fn join_responses(assessment: &Assessment, responses: &[StudentResponse]) -> JoinOutcome {
    let responses: Vec<&StudentResponse> = responses
        .iter()
        .filter(|response| response.assessment_id == assessment.id)
        .collect();

    let Some(key) = assessment.answer_key.as_ref() else {
        if !responses.is_empty() {
            warn!(
                assessment = %assessment.id,
                responses = responses.len(),
                "assessment has responses but no answer key; skipping"
            );
        }
        return JoinOutcome {
            missing_key: !responses.is_empty(),
            ..JoinOutcome::default()
        };
    };

    let key_questions: HashSet<u32> = key.items.iter().map(|item| item.question).collect();
    let mut outcome = JoinOutcome::default();

    for response in responses.into_iter().filter(|r| r.participates()) {
        let submitted: HashMap<u32, &str> = response
            .items
            .iter()
            .map(|item| (item.question, item.answer.as_str()))
            .collect();

        outcome.orphaned_items += submitted
            .keys()
            .filter(|question| !key_questions.contains(question))
            .count();

        outcome.records.extend(key.items.iter().map(|item| {
            let answer = submitted.get(&item.question).copied().unwrap_or("");
            CorrectnessRecord {
                student_id: response.student_id,
                assessment_id: assessment.id,
                question: item.question,
                descriptor_code: item.descriptor.as_ref().map(|d| d.code.clone()),
                subject: classify(item, assessment),
                correct: answer == item.correct_answer,
            }
        }));
    }

    if outcome.orphaned_items > 0 {
        debug!(
            assessment = %assessment.id,
            orphaned = outcome.orphaned_items,
            "ignored response items without a matching key question"
        );
    }

    outcome
}
