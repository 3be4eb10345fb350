use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    AnswerKey, AnswerKeyItem, Assessment, Class, Descriptor, ResponseItem, School, Student,
    StudentResponse,
};
use crate::selector::{Catalog, ReportFilter};
use crate::source::ReportSource;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed report input.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn question_number(value: i32) -> anyhow::Result<u32> {
    u32::try_from(value).with_context(|| format!("invalid question number {value}"))
}

#[async_trait]
impl ReportSource for PgSource {
    async fn fetch_catalog(&self) -> anyhow::Result<Catalog> {
        let schools = sqlx::query("SELECT id, nome FROM smaipa.escolas ORDER BY nome, id")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| School {
                id: row.get("id"),
                name: row.get("nome"),
            })
            .collect();

        let classes = sqlx::query(
            "SELECT id, escola_id, nome, serie FROM smaipa.turmas ORDER BY nome, id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Class {
            id: row.get("id"),
            school_id: row.get("escola_id"),
            name: row.get("nome"),
            grade: row.get("serie"),
        })
        .collect();

        let students = sqlx::query("SELECT id, turma_id, nome FROM smaipa.alunos ORDER BY nome, id")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| Student {
                id: row.get("id"),
                class_id: row.get("turma_id"),
                name: row.get("nome"),
            })
            .collect();

        Ok(Catalog {
            schools,
            classes,
            students,
        })
    }

    async fn fetch_assessments(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Assessment>> {
        let mut query = String::from(
            "SELECT id, nome, componente, serie, data_aplicacao, status, escola_id \
             FROM smaipa.avaliacoes WHERE TRUE",
        );

        // A specific assessment must be found even when other filters disagree.
        let (school_id, subject) = match filter.assessment_id {
            Some(_) => (None, None),
            None => (filter.school_id, filter.subject),
        };
        let mut position = 0;
        if filter.assessment_id.is_some() {
            position += 1;
            query.push_str(&format!(" AND id = ${position}"));
        }
        if school_id.is_some() {
            position += 1;
            query.push_str(&format!(" AND escola_id = ${position}"));
        }
        if subject.is_some() {
            position += 1;
            query.push_str(&format!(" AND componente = ${position}"));
        }
        query.push_str(" ORDER BY data_aplicacao NULLS LAST, nome, id");

        let mut rows = sqlx::query(&query);
        if let Some(value) = filter.assessment_id {
            rows = rows.bind(value);
        }
        if let Some(value) = school_id {
            rows = rows.bind(value);
        }
        if let Some(value) = subject {
            rows = rows.bind(value.as_str());
        }

        let mut assessments = Vec::new();
        for row in rows.fetch_all(&self.pool).await? {
            let subject: String = row.get("componente");
            let status: String = row.get("status");
            assessments.push(Assessment {
                id: row.get("id"),
                name: row.get("nome"),
                subject: subject.parse()?,
                grade: row.get("serie"),
                application_date: row.get::<Option<NaiveDate>, _>("data_aplicacao"),
                status: status.parse()?,
                school_id: row.get("escola_id"),
                answer_key: None,
            });
        }

        if assessments.is_empty() {
            return Ok(assessments);
        }

        let ids: Vec<Uuid> = assessments.iter().map(|assessment| assessment.id).collect();
        let item_rows = sqlx::query(
            r#"
            SELECT g.avaliacao_id, gi.numero, gi.resposta_correta,
                   d.codigo, d.descricao, d.componente AS descritor_componente, d.tipo_avaliacao
            FROM smaipa.gabaritos g
            LEFT JOIN smaipa.gabarito_itens gi ON gi.gabarito_id = g.id
            LEFT JOIN smaipa.descritores d ON d.id = gi.descritor_id
            WHERE g.avaliacao_id = ANY($1)
            ORDER BY g.avaliacao_id, gi.numero
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut keys: HashMap<Uuid, AnswerKey> = HashMap::new();
        for row in item_rows {
            let key = keys.entry(row.get("avaliacao_id")).or_default();
            let Some(numero) = row.get::<Option<i32>, _>("numero") else {
                continue;
            };

            let descriptor = match row.get::<Option<String>, _>("codigo") {
                Some(code) => {
                    let subject: String = row.get("descritor_componente");
                    Some(Descriptor {
                        code,
                        description: row.get("descricao"),
                        subject: subject.parse()?,
                        assessment_type: row.get("tipo_avaliacao"),
                    })
                }
                None => None,
            };

            key.items.push(AnswerKeyItem {
                question: question_number(numero)?,
                correct_answer: row.get("resposta_correta"),
                descriptor,
            });
        }

        for assessment in &mut assessments {
            assessment.answer_key = keys.remove(&assessment.id);
        }

        Ok(assessments)
    }

    async fn fetch_responses(&self, assessment_id: Uuid) -> anyhow::Result<Vec<StudentResponse>> {
        let item_rows = sqlx::query(
            r#"
            SELECT ri.resposta_id, ri.numero, ri.resposta
            FROM smaipa.resposta_itens ri
            JOIN smaipa.respostas r ON r.id = ri.resposta_id
            WHERE r.avaliacao_id = $1
            ORDER BY ri.resposta_id, ri.numero
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<ResponseItem>> = HashMap::new();
        for row in item_rows {
            let numero: i32 = row.get("numero");
            let Ok(question) = u32::try_from(numero) else {
                warn!(assessment = %assessment_id, numero, "skipping response item with invalid question number");
                continue;
            };
            items
                .entry(row.get("resposta_id"))
                .or_default()
                .push(ResponseItem {
                    question,
                    answer: row.get("resposta"),
                });
        }

        let responses = sqlx::query(
            r#"
            SELECT id, aluno_id, compareceu, transferido
            FROM smaipa.respostas
            WHERE avaliacao_id = $1
            ORDER BY id
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            let id: Uuid = row.get("id");
            StudentResponse {
                assessment_id,
                student_id: row.get("aluno_id"),
                attended: row.get("compareceu"),
                transferred: row.get("transferido"),
                items: items.remove(&id).unwrap_or_default(),
            }
        })
        .collect();

        Ok(responses)
    }
}

const SCHOOL_ID: &str = "5b0d6f0e-6a3e-4e8a-9d1f-1c2b3a4d5e01";

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    let school_id = Uuid::parse_str(SCHOOL_ID)?;

    sqlx::query(
        r#"
        INSERT INTO smaipa.escolas (id, nome)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET nome = EXCLUDED.nome
        "#,
    )
    .bind(school_id)
    .bind("EMEF Professora Maria José")
    .execute(&mut *tx)
    .await?;

    let classes = vec![
        ("a6c1e5d2-3f4b-4c1a-8e2d-7f6a5b4c3d01", "5º Ano A"),
        ("a6c1e5d2-3f4b-4c1a-8e2d-7f6a5b4c3d02", "5º Ano B"),
    ];
    for (id, name) in &classes {
        sqlx::query(
            r#"
            INSERT INTO smaipa.turmas (id, escola_id, nome, serie)
            VALUES ($1, $2, $3, '5')
            ON CONFLICT (id) DO UPDATE SET nome = EXCLUDED.nome, serie = EXCLUDED.serie
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(school_id)
        .bind(*name)
        .execute(&mut *tx)
        .await?;
    }

    let students = vec![
        ("c1d2e3f4-0a1b-4c2d-8e3f-9a0b1c2d3e01", classes[0].0, "Ana Beatriz Souza"),
        ("c1d2e3f4-0a1b-4c2d-8e3f-9a0b1c2d3e02", classes[0].0, "Bruno Henrique Lima"),
        ("c1d2e3f4-0a1b-4c2d-8e3f-9a0b1c2d3e03", classes[0].0, "Carla Fernanda Reis"),
        ("c1d2e3f4-0a1b-4c2d-8e3f-9a0b1c2d3e04", classes[1].0, "Davi Oliveira Santos"),
        ("c1d2e3f4-0a1b-4c2d-8e3f-9a0b1c2d3e05", classes[1].0, "Eduarda Martins Costa"),
    ];
    for (id, class_id, name) in &students {
        sqlx::query(
            r#"
            INSERT INTO smaipa.alunos (id, turma_id, nome)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET turma_id = EXCLUDED.turma_id, nome = EXCLUDED.nome
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(Uuid::parse_str(class_id)?)
        .bind(*name)
        .execute(&mut *tx)
        .await?;
    }

    let descriptors = vec![
        ("D1", "Localizar informações explícitas em um texto", "PORTUGUES"),
        ("D3", "Inferir o sentido de uma palavra ou expressão", "PORTUGUES"),
        ("D6", "Identificar o tema de um texto", "PORTUGUES"),
        ("D13", "Resolver problema envolvendo o cálculo de área de figuras planas", "MATEMATICA"),
        ("D17", "Calcular o resultado de uma adição ou subtração de números naturais", "MATEMATICA"),
        ("D19", "Resolver problema com números naturais envolvendo multiplicação", "MATEMATICA"),
    ];
    let mut descriptor_ids: HashMap<&str, Uuid> = HashMap::new();
    for (code, description, subject) in &descriptors {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO smaipa.descritores (id, codigo, descricao, componente, tipo_avaliacao)
            VALUES ($1, $2, $3, $4, 'DIAGNOSTICA')
            ON CONFLICT (codigo) DO UPDATE
            SET descricao = EXCLUDED.descricao, componente = EXCLUDED.componente
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(*code)
        .bind(*description)
        .bind(*subject)
        .fetch_one(&mut *tx)
        .await?
        .get("id");
        descriptor_ids.insert(*code, id);
    }

    let assessments = vec![
        (
            "e7f8a9b0-1c2d-4e3f-8a4b-5c6d7e8f9a01",
            "Avaliação Diagnóstica 1 - Língua Portuguesa",
            "PORTUGUES",
            NaiveDate::from_ymd_opt(2024, 3, 1).context("invalid date")?,
            vec![(1, "A", Some("D1")), (2, "C", Some("D3")), (3, "B", Some("D6")), (4, "D", None)],
            ["ACBD", "ACCD", "BCBA", "", "ADBD"],
        ),
        (
            "e7f8a9b0-1c2d-4e3f-8a4b-5c6d7e8f9a02",
            "Avaliação Diagnóstica 1 - Matemática",
            "MATEMATICA",
            NaiveDate::from_ymd_opt(2024, 3, 1).context("invalid date")?,
            vec![(1, "B", Some("D13")), (2, "B", Some("D17")), (3, "E", Some("D19")), (4, "A", Some("D17"))],
            ["BBEA", "BCEA", "", "ABCA", "BBEE"],
        ),
        (
            "e7f8a9b0-1c2d-4e3f-8a4b-5c6d7e8f9a03",
            "Avaliação Diagnóstica 2 - Matemática",
            "MATEMATICA",
            NaiveDate::from_ymd_opt(2024, 6, 10).context("invalid date")?,
            vec![(1, "C", Some("D13")), (2, "D", Some("D19")), (3, "A", Some("D17"))],
            ["CDA", "CDB", "CAA", "BDA", ""],
        ),
    ];

    for (id, name, subject, applied_on, key, answers) in &assessments {
        let assessment_id = Uuid::parse_str(id)?;
        sqlx::query(
            r#"
            INSERT INTO smaipa.avaliacoes
            (id, nome, componente, serie, data_aplicacao, status, escola_id)
            VALUES ($1, $2, $3, '5', $4, 'CONCLUIDA', $5)
            ON CONFLICT (id) DO UPDATE
            SET nome = EXCLUDED.nome, data_aplicacao = EXCLUDED.data_aplicacao
            "#,
        )
        .bind(assessment_id)
        .bind(*name)
        .bind(*subject)
        .bind(*applied_on)
        .bind(school_id)
        .execute(&mut *tx)
        .await?;

        let key_id: Uuid = sqlx::query(
            r#"
            INSERT INTO smaipa.gabaritos (id, avaliacao_id)
            VALUES ($1, $2)
            ON CONFLICT (avaliacao_id) DO UPDATE SET avaliacao_id = EXCLUDED.avaliacao_id
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assessment_id)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        for (numero, correct, code) in key {
            let descriptor_id = (*code).and_then(|code| descriptor_ids.get(code).copied());
            sqlx::query(
                r#"
                INSERT INTO smaipa.gabarito_itens (gabarito_id, numero, resposta_correta, descritor_id)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (gabarito_id, numero) DO UPDATE
                SET resposta_correta = EXCLUDED.resposta_correta, descritor_id = EXCLUDED.descritor_id
                "#,
            )
            .bind(key_id)
            .bind(*numero)
            .bind(*correct)
            .bind(descriptor_id)
            .execute(&mut *tx)
            .await?;
        }

        for ((student_id, _, _), answer_sheet) in students.iter().zip(answers.iter()) {
            // An empty sheet marks an absent student; the last student of
            // 5º Ano B was transferred before the second math assessment.
            let attended = !answer_sheet.is_empty();
            let transferred = !attended && *student_id == students[4].0;
            insert_response(
                &mut tx,
                assessment_id,
                Uuid::parse_str(student_id)?,
                attended,
                transferred,
                answer_sheet,
            )
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn insert_response(
    tx: &mut Transaction<'_, Postgres>,
    assessment_id: Uuid,
    student_id: Uuid,
    attended: bool,
    transferred: bool,
    answer_sheet: &str,
) -> anyhow::Result<()> {
    let response_id: Uuid = sqlx::query(
        r#"
        INSERT INTO smaipa.respostas (id, avaliacao_id, aluno_id, compareceu, transferido)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (avaliacao_id, aluno_id) DO UPDATE
        SET compareceu = EXCLUDED.compareceu, transferido = EXCLUDED.transferido
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(assessment_id)
    .bind(student_id)
    .bind(attended)
    .bind(transferred)
    .fetch_one(&mut **tx)
    .await?
    .get("id");

    for (index, answer) in answer_sheet.chars().enumerate() {
        let numero = i32::try_from(index + 1).context("answer sheet too long")?;
        sqlx::query(
            r#"
            INSERT INTO smaipa.resposta_itens (resposta_id, numero, resposta)
            VALUES ($1, $2, $3)
            ON CONFLICT (resposta_id, numero) DO UPDATE SET resposta = EXCLUDED.resposta
            "#,
        )
        .bind(response_id)
        .bind(numero)
        .bind(answer.to_string())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
