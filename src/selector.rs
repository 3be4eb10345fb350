use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{Assessment, Class, School, Student, Subject};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(rename = "escolaId", default)]
    pub school_id: Option<Uuid>,
    #[serde(rename = "turmaId", default)]
    pub class_id: Option<Uuid>,
    #[serde(rename = "componente", default)]
    pub subject: Option<Subject>,
    #[serde(rename = "avaliacaoId", default)]
    pub assessment_id: Option<Uuid>,
    #[serde(rename = "alunoId", default)]
    pub student_id: Option<Uuid>,
}

impl ReportFilter {
    pub fn canonical(&self) -> String {
        fn part<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        format!(
            "escola={}|turma={}|componente={}|avaliacao={}|aluno={}",
            part(&self.school_id),
            part(&self.class_id),
            part(&self.subject),
            part(&self.assessment_id),
            part(&self.student_id),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub schools: Vec<School>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl Catalog {
    pub fn school(&self, id: Uuid) -> Option<&School> {
        self.schools.iter().find(|school| school.id == id)
    }

    pub fn class(&self, id: Uuid) -> Option<&Class> {
        self.classes.iter().find(|class| class.id == id)
    }

    pub fn student(&self, id: Uuid) -> Option<&Student> {
        self.students.iter().find(|student| student.id == id)
    }

    pub fn students_in(&self, class_id: Uuid) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|student| student.class_id == class_id)
            .collect()
    }
}

/// A class narrows by grade: an assessment is applied to a whole grade level.
/// A specific assessment id wins over every other criterion.
pub fn select_assessments(
    catalog: &Catalog,
    assessments: &[Assessment],
    filter: &ReportFilter,
) -> Result<Vec<Assessment>, ReportError> {
    if let Some(school_id) = filter.school_id {
        catalog
            .school(school_id)
            .ok_or(ReportError::SchoolNotFound(school_id))?;
    }
    if let Some(student_id) = filter.student_id {
        catalog
            .student(student_id)
            .ok_or(ReportError::StudentNotFound(student_id))?;
    }

    let grade = match filter.class_id {
        Some(class_id) => Some(
            catalog
                .class(class_id)
                .map(|class| class.grade.as_str())
                .ok_or(ReportError::ClassNotFound(class_id))?,
        ),
        None => None,
    };

    if let Some(assessment_id) = filter.assessment_id {
        return assessments
            .iter()
            .find(|assessment| assessment.id == assessment_id)
            .cloned()
            .map(|assessment| vec![assessment])
            .ok_or(ReportError::AssessmentNotFound(assessment_id));
    }

    Ok(assessments
        .iter()
        .filter(|assessment| {
            filter
                .school_id
                .map_or(true, |school_id| assessment.school_id == school_id)
        })
        .filter(|assessment| grade.map_or(true, |grade| assessment.grade == grade))
        .filter(|assessment| {
            filter
                .subject
                .map_or(true, |subject| assessment.subject == subject)
        })
        .cloned()
        .collect())
}

pub fn response_scope(
    catalog: &Catalog,
    filter: &ReportFilter,
) -> Result<Option<HashSet<Uuid>>, ReportError> {
    if let Some(student_id) = filter.student_id {
        catalog
            .student(student_id)
            .ok_or(ReportError::StudentNotFound(student_id))?;
        return Ok(Some(HashSet::from([student_id])));
    }

    match filter.class_id {
        Some(class_id) => {
            catalog
                .class(class_id)
                .ok_or(ReportError::ClassNotFound(class_id))?;
            Ok(Some(
                catalog
                    .students_in(class_id)
                    .into_iter()
                    .map(|student| student.id)
                    .collect(),
            ))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn universe(catalog: &Catalog) -> Vec<Assessment> {
        let school_id = catalog.schools[0].id;
        let mut other_grade = testing::assessment(school_id, Subject::Portugues, None, vec![]);
        other_grade.grade = "9".to_string();
        vec![
            testing::assessment(school_id, Subject::Matematica, Some("2024-03-01"), vec![]),
            testing::assessment(school_id, Subject::Portugues, Some("2024-04-01"), vec![]),
            other_grade,
            testing::assessment(Uuid::new_v4(), Subject::Matematica, None, vec![]),
        ]
    }

    #[test]
    fn no_filter_keeps_everything_in_order() {
        let catalog = testing::catalog(1);
        let assessments = universe(&catalog);
        let selected = select_assessments(&catalog, &assessments, &ReportFilter::default()).unwrap();
        assert_eq!(selected, assessments);
    }

    #[test]
    fn class_resolves_to_grade_and_subject_matches_exactly() {
        let catalog = testing::catalog(1);
        let assessments = universe(&catalog);
        let filter = ReportFilter {
            class_id: Some(catalog.classes[0].id),
            subject: Some(Subject::Matematica),
            ..ReportFilter::default()
        };
        let selected = select_assessments(&catalog, &assessments, &filter).unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected
            .iter()
            .all(|a| a.grade == "5" && a.subject == Subject::Matematica));
    }

    #[test]
    fn school_filter_narrows_by_owner() {
        let catalog = testing::catalog(1);
        let assessments = universe(&catalog);
        let filter = ReportFilter {
            school_id: Some(catalog.schools[0].id),
            ..ReportFilter::default()
        };
        let selected = select_assessments(&catalog, &assessments, &filter).unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn assessment_id_overrides_other_filters() {
        let catalog = testing::catalog(1);
        let assessments = universe(&catalog);
        let filter = ReportFilter {
            class_id: Some(catalog.classes[0].id),
            assessment_id: Some(assessments[2].id),
            subject: Some(Subject::Matematica),
            ..ReportFilter::default()
        };
        let selected = select_assessments(&catalog, &assessments, &filter).unwrap();
        assert_eq!(selected, vec![assessments[2].clone()]);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let catalog = testing::catalog(1);
        let filter = ReportFilter {
            class_id: Some(catalog.classes[0].id),
            ..ReportFilter::default()
        };
        let selected = select_assessments(&catalog, &[], &filter).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn unknown_references_are_not_found() {
        let catalog = testing::catalog(1);
        let missing = Uuid::new_v4();
        let by_class = ReportFilter {
            class_id: Some(missing),
            ..ReportFilter::default()
        };
        assert_eq!(
            select_assessments(&catalog, &[], &by_class),
            Err(ReportError::ClassNotFound(missing))
        );
        let by_assessment = ReportFilter {
            assessment_id: Some(missing),
            ..ReportFilter::default()
        };
        assert_eq!(
            select_assessments(&catalog, &[], &by_assessment),
            Err(ReportError::AssessmentNotFound(missing))
        );
        let by_school = ReportFilter {
            school_id: Some(missing),
            ..ReportFilter::default()
        };
        assert!(select_assessments(&catalog, &[], &by_school)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn scope_follows_class_or_student() {
        let catalog = testing::catalog(3);
        assert_eq!(response_scope(&catalog, &ReportFilter::default()).unwrap(), None);

        let by_class = ReportFilter {
            class_id: Some(catalog.classes[0].id),
            ..ReportFilter::default()
        };
        assert_eq!(response_scope(&catalog, &by_class).unwrap().unwrap().len(), 3);

        let student_id = catalog.students[1].id;
        let by_student = ReportFilter {
            class_id: Some(catalog.classes[0].id),
            student_id: Some(student_id),
            ..ReportFilter::default()
        };
        assert_eq!(
            response_scope(&catalog, &by_student).unwrap(),
            Some(HashSet::from([student_id]))
        );
    }

    #[test]
    fn canonical_form_is_stable() {
        let filter = ReportFilter {
            subject: Some(Subject::Portugues),
            ..ReportFilter::default()
        };
        assert_eq!(filter.canonical(), filter.clone().canonical());
        assert!(filter.canonical().contains("componente=PORTUGUES"));
        assert_ne!(filter.canonical(), ReportFilter::default().canonical());
    }

    #[test]
    fn filter_reads_dashboard_request() {
        let filter: ReportFilter =
            serde_json::from_str(r#"{"componente":"matematica"}"#).unwrap();
        assert_eq!(filter.subject, Some(Subject::Matematica));
        assert!(filter.class_id.is_none());

        let mixed: ReportFilter = serde_json::from_str(r#"{"componente":"Portugues"}"#).unwrap();
        assert_eq!(mixed.subject, Some(Subject::Portugues));
    }
}
