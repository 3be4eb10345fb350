use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReportError;

/// Curricular component an assessment or descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Subject {
    #[serde(rename = "PORTUGUES")]
    Portugues,
    #[serde(rename = "MATEMATICA")]
    Matematica,
}

impl Subject {
    pub const ALL: [Subject; 2] = [Subject::Portugues, Subject::Matematica];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Portugues => "PORTUGUES",
            Subject::Matematica => "MATEMATICA",
        }
    }

    /// Lowercase key used in report payloads.
    pub fn key(self) -> &'static str {
        match self {
            Subject::Portugues => "portugues",
            Subject::Matematica => "matematica",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Subject {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Subject {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portugues" => Ok(Subject::Portugues),
            "matematica" => Ok(Subject::Matematica),
            _ => Err(ReportError::UnknownSubject(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    Agendada,
    EmAndamento,
    Concluida,
    Cancelada,
}

impl AssessmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentStatus::Agendada => "AGENDADA",
            AssessmentStatus::EmAndamento => "EM_ANDAMENTO",
            AssessmentStatus::Concluida => "CONCLUIDA",
            AssessmentStatus::Cancelada => "CANCELADA",
        }
    }
}

impl FromStr for AssessmentStatus {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AGENDADA" => Ok(AssessmentStatus::Agendada),
            "EM_ANDAMENTO" => Ok(AssessmentStatus::EmAndamento),
            "CONCLUIDA" => Ok(AssessmentStatus::Concluida),
            "CANCELADA" => Ok(AssessmentStatus::Cancelada),
            _ => Err(ReportError::UnknownStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub school_id: Uuid,
    pub name: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub class_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub code: String,
    pub description: String,
    pub subject: Subject,
    #[serde(default)]
    pub assessment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeyItem {
    pub question: u32,
    pub correct_answer: String,
    #[serde(default)]
    pub descriptor: Option<Descriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKey {
    pub items: Vec<AnswerKeyItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: Uuid,
    pub name: String,
    pub subject: Subject,
    pub grade: String,
    #[serde(default)]
    pub application_date: Option<NaiveDate>,
    pub status: AssessmentStatus,
    pub school_id: Uuid,
    #[serde(default)]
    pub answer_key: Option<AnswerKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub question: u32,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponse {
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub attended: bool,
    pub transferred: bool,
    #[serde(default)]
    pub items: Vec<ResponseItem>,
}

impl StudentResponse {
    /// Only students who attended and were not transferred are scored.
    pub fn participates(&self) -> bool {
        self.attended && !self.transferred
    }
}

/// One scored question for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectnessRecord {
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub question: u32,
    pub descriptor_code: Option<String>,
    pub subject: Subject,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionPoint {
    pub avaliacao: String,
    pub portugues: f64,
    pub matematica: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorPerformance {
    pub codigo: String,
    pub nome: String,
    pub componente: Subject,
    pub acertos: u32,
    pub total: u32,
    pub percentual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPerformance {
    pub componente: Subject,
    pub acertos: u32,
    pub total: u32,
    pub percentual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub aluno_id: Uuid,
    pub nome: String,
    pub portugues: Option<f64>,
    pub matematica: Option<f64>,
    pub media: Option<f64>,
    pub compareceu: bool,
    pub transferido: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPanel {
    pub avaliacao_id: Uuid,
    pub avaliacao: String,
    pub alunos: Vec<StudentRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub itens_orfaos: usize,
    pub avaliacoes_sem_gabarito: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub evolucao_desempenho: Vec<EvolutionPoint>,
    pub desempenho_habilidades: Vec<serde_json::Value>,
    pub desempenho_descritores: Vec<DescriptorPerformance>,
    pub desempenho_componentes: Vec<SubjectPerformance>,
    pub painel_turma: Vec<ClassPanel>,
    pub diagnostico: Diagnostics,
}

impl ReportResult {
    pub fn is_empty(&self) -> bool {
        self.evolucao_desempenho.is_empty()
            && self.desempenho_descritores.is_empty()
            && self.painel_turma.is_empty()
    }
}
