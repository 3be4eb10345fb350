use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    AnswerKey, AnswerKeyItem, Assessment, AssessmentStatus, Class, Descriptor, ResponseItem,
    School, Student, StudentResponse, Subject,
};
use crate::selector::Catalog;

pub fn descriptor(code: &str, subject: Subject) -> Descriptor {
    Descriptor {
        code: code.to_string(),
        description: format!("Habilidade {code}"),
        subject,
        assessment_type: None,
    }
}

pub fn key_item(question: u32, answer: &str, descriptor: Option<Descriptor>) -> AnswerKeyItem {
    AnswerKeyItem {
        question,
        correct_answer: answer.to_string(),
        descriptor,
    }
}

pub fn assessment(
    school_id: Uuid,
    subject: Subject,
    date: Option<&str>,
    items: Vec<AnswerKeyItem>,
) -> Assessment {
    Assessment {
        id: Uuid::new_v4(),
        name: "Avaliação 1".to_string(),
        subject,
        grade: "5".to_string(),
        application_date: date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        status: AssessmentStatus::Concluida,
        school_id,
        answer_key: Some(AnswerKey { items }),
    }
}

pub fn response(
    assessment: &Assessment,
    student_id: Uuid,
    attended: bool,
    items: &[(u32, &str)],
) -> StudentResponse {
    StudentResponse {
        assessment_id: assessment.id,
        student_id,
        attended,
        transferred: false,
        items: items
            .iter()
            .map(|(question, answer)| ResponseItem {
                question: *question,
                answer: answer.to_string(),
            })
            .collect(),
    }
}

/// One school, one grade-5 class and the given number of students.
pub fn catalog(students: usize) -> Catalog {
    let school = School {
        id: Uuid::new_v4(),
        name: "EMEF Monteiro Lobato".to_string(),
    };
    let class = Class {
        id: Uuid::new_v4(),
        school_id: school.id,
        name: "5º Ano A".to_string(),
        grade: "5".to_string(),
    };
    let students = (0..students)
        .map(|index| Student {
            id: Uuid::new_v4(),
            class_id: class.id,
            name: format!("Aluno {}", index + 1),
        })
        .collect();

    Catalog {
        schools: vec![school],
        classes: vec![class],
        students,
    }
}
