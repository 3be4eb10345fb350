use std::collections::HashSet;
use std::fmt::Write;

use tracing::debug;
use uuid::Uuid;

use crate::aggregate::{aggregate, Aggregation, Tally};
use crate::error::ReportError;
use crate::joiner::join_responses;
use crate::models::{
    Assessment, ClassPanel, CorrectnessRecord, DescriptorPerformance, Diagnostics,
    EvolutionPoint, ReportResult, Student, StudentResponse, StudentRow, Subject,
    SubjectPerformance,
};
use crate::selector::{response_scope, select_assessments, Catalog, ReportFilter};

/// Per-descriptor accuracy, sorted by plain string comparison of the code
/// ("D10" sorts before "D2").
pub fn descriptor_breakdown(
    aggregation: &Aggregation,
    subject: Option<Subject>,
) -> Vec<DescriptorPerformance> {
    let mut rows: Vec<DescriptorPerformance> = aggregation
        .descriptors
        .values()
        .filter(|descriptor| subject.map_or(true, |subject| descriptor.subject == subject))
        .map(|descriptor| DescriptorPerformance {
            codigo: descriptor.code.clone(),
            nome: descriptor.name.clone(),
            componente: descriptor.subject,
            acertos: descriptor.tally.correct,
            total: descriptor.tally.total,
            percentual: descriptor.tally.percentage(),
        })
        .collect();

    rows.sort_by(|a, b| a.codigo.cmp(&b.codigo));
    rows
}

/// One point per date bucket, in the order buckets were first seen.
pub fn evolution(aggregation: &Aggregation) -> Vec<EvolutionPoint> {
    aggregation
        .buckets
        .iter()
        .map(|(bucket, split)| EvolutionPoint {
            avaliacao: bucket.clone(),
            portugues: split.portugues.percentage(),
            matematica: split.matematica.percentage(),
        })
        .collect()
}

pub fn subject_summary(aggregation: &Aggregation) -> Vec<SubjectPerformance> {
    aggregation
        .subjects
        .iter()
        .map(|(subject, tally)| SubjectPerformance {
            componente: *subject,
            acertos: tally.correct,
            total: tally.total,
            percentual: tally.percentage(),
        })
        .collect()
}

/// Dashboard rows for the students of a class on one assessment.
///
/// A student without a response keeps `None` percentages and is reported
/// absent. The average is the plain mean of the subject percentages present.
pub fn class_dashboard(
    assessment: &Assessment,
    students: &[&Student],
    responses: &[StudentResponse],
    records: &[CorrectnessRecord],
) -> Vec<StudentRow> {
    students
        .iter()
        .map(|student| {
            let response = responses.iter().find(|response| {
                response.assessment_id == assessment.id && response.student_id == student.id
            });

            let Some(response) = response else {
                return StudentRow {
                    aluno_id: student.id,
                    nome: student.name.clone(),
                    portugues: None,
                    matematica: None,
                    media: None,
                    compareceu: false,
                    transferido: false,
                };
            };

            let own = records
                .iter()
                .filter(|record| record.student_id == student.id);
            let (portugues, matematica) =
                own.fold((Tally::default(), Tally::default()), |(pt, mt), record| {
                    match record.subject {
                        Subject::Portugues => (pt.record(record.correct), mt),
                        Subject::Matematica => (pt, mt.record(record.correct)),
                    }
                });
            let portugues = (portugues.total > 0).then(|| portugues.percentage());
            let matematica = (matematica.total > 0).then(|| matematica.percentage());
            let present: Vec<f64> = [portugues, matematica].into_iter().flatten().collect();
            let media = (!present.is_empty())
                .then(|| present.iter().sum::<f64>() / present.len() as f64);

            StudentRow {
                aluno_id: student.id,
                nome: student.name.clone(),
                portugues,
                matematica,
                media,
                compareceu: response.attended,
                transferido: response.transferred,
            }
        })
        .collect()
}

/// Computes the full report for already fetched data.
///
/// `assessments` is the candidate universe and `responses` may span several
/// assessments; both are filtered here. The result depends only on the input.
pub fn compute_report(
    catalog: &Catalog,
    assessments: &[Assessment],
    responses: &[StudentResponse],
    filter: &ReportFilter,
) -> Result<ReportResult, ReportError> {
    let selected = select_assessments(catalog, assessments, filter)?;
    let scope = response_scope(catalog, filter)?;
    let in_scope = |response: &&StudentResponse| {
        scope
            .as_ref()
            .map_or(true, |students: &HashSet<Uuid>| students.contains(&response.student_id))
    };
    let scoped: Vec<StudentResponse> = responses.iter().filter(in_scope).cloned().collect();

    let mut diagnostics = Diagnostics::default();
    let mut scored: Vec<(&Assessment, Vec<CorrectnessRecord>)> = Vec::with_capacity(selected.len());
    for assessment in &selected {
        let outcome = join_responses(assessment, &scoped);
        diagnostics.itens_orfaos += outcome.orphaned_items;
        if outcome.missing_key {
            diagnostics.avaliacoes_sem_gabarito.push(assessment.id);
        }
        scored.push((assessment, outcome.records));
    }

    let aggregation = aggregate(
        scored
            .iter()
            .map(|(assessment, records)| (*assessment, records.as_slice())),
    );
    debug!(
        assessments = selected.len(),
        responses = scoped.len(),
        descriptors = aggregation.descriptors.len(),
        buckets = aggregation.buckets.len(),
        "aggregated report"
    );

    if aggregation.is_empty() {
        return Ok(ReportResult {
            diagnostico: diagnostics,
            ..ReportResult::default()
        });
    }

    let painel_turma = match filter.class_id.and_then(|id| catalog.class(id)) {
        Some(class) => {
            let students = catalog.students_in(class.id);
            let students: Vec<&Student> = students
                .into_iter()
                .filter(|student| filter.student_id.map_or(true, |id| id == student.id))
                .collect();
            scored
                .iter()
                .map(|(assessment, records)| ClassPanel {
                    avaliacao_id: assessment.id,
                    avaliacao: assessment.name.clone(),
                    alunos: class_dashboard(assessment, &students, &scoped, records),
                })
                .collect()
        }
        None => Vec::new(),
    };

    Ok(ReportResult {
        evolucao_desempenho: evolution(&aggregation),
        desempenho_habilidades: Vec::new(),
        desempenho_descritores: descriptor_breakdown(&aggregation, filter.subject),
        desempenho_componentes: subject_summary(&aggregation),
        painel_turma,
        diagnostico: diagnostics,
    })
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"))
}

/// Markdown rendering of a computed report. Percentages are rounded here only.
pub fn render_markdown(result: &ReportResult, scope_label: Option<&str>) -> String {
    let mut output = String::new();
    let label = scope_label.unwrap_or("todas as avaliações");

    let _ = writeln!(output, "# Relatório de Desempenho por Descritor");
    let _ = writeln!(output, "Gerado para {label}");
    let _ = writeln!(output);

    if result.is_empty() {
        let _ = writeln!(output, "Nenhum dado encontrado para os filtros informados.");
        return output;
    }

    let _ = writeln!(output, "## Evolução do Desempenho");
    for point in &result.evolucao_desempenho {
        let _ = writeln!(
            output,
            "- {}: português {:.1}%, matemática {:.1}%",
            point.avaliacao, point.portugues, point.matematica
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Desempenho por Componente");
    if result.desempenho_componentes.is_empty() {
        let _ = writeln!(output, "Nenhuma resposta corrigida.");
    }
    for summary in &result.desempenho_componentes {
        let _ = writeln!(
            output,
            "- {}: {:.1}% ({} de {} acertos)",
            summary.componente.key(),
            summary.percentual,
            summary.acertos,
            summary.total
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Desempenho por Descritor");
    if result.desempenho_descritores.is_empty() {
        let _ = writeln!(output, "Nenhum descritor vinculado ao gabarito.");
    }
    for descriptor in &result.desempenho_descritores {
        let _ = writeln!(
            output,
            "- {} {}: {:.1}% ({} de {})",
            descriptor.codigo,
            descriptor.nome,
            descriptor.percentual,
            descriptor.acertos,
            descriptor.total
        );
    }

    for panel in &result.painel_turma {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Turma: {}", panel.avaliacao);
        for row in &panel.alunos {
            let status = if row.transferido {
                "transferido"
            } else if row.compareceu {
                "presente"
            } else {
                "ausente"
            };
            let _ = writeln!(
                output,
                "- {} ({}): português {}, matemática {}, média {}",
                row.nome,
                status,
                format_percent(row.portugues),
                format_percent(row.matematica),
                format_percent(row.media)
            );
        }
    }

    let diagnostics = &result.diagnostico;
    if diagnostics.itens_orfaos > 0 || !diagnostics.avaliacoes_sem_gabarito.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Diagnóstico");
        let _ = writeln!(
            output,
            "- itens sem questão correspondente no gabarito: {}",
            diagnostics.itens_orfaos
        );
        let _ = writeln!(
            output,
            "- avaliações sem gabarito: {}",
            diagnostics.avaliacoes_sem_gabarito.len()
        );
    }

    output
}
