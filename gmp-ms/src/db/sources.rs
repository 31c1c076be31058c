//! Query engine sources over the roster and note tables
//!
//! Filters, sort and the page window are pushed into SQL so a request only
//! reads the rows it returns, plus one `COUNT(*)` over the filtered set.

use super::notes::{self, note_from_row, SELECT_NOTE};
use super::patients::{patient_from_row, SELECT_PATIENT};
use crate::models::{Note, Patient};
use crate::query::{
    Filter, FilterOp, Page, PageRequest, QueryError, RecordSource, SortDir, SourceResponse,
};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;

/// A field callers may filter or sort on and the SQL expression behind it
struct Column {
    field: &'static str,
    expr: &'static str,
    /// Sort with `COLLATE NOCASE`
    nocase: bool,
}

const fn column(field: &'static str, expr: &'static str, nocase: bool) -> Column {
    Column { field, expr, nocase }
}

const PATIENT_COLUMNS: &[Column] = &[
    column("id", "id", false),
    column("patient_id", "patient_id", true),
    column("first_name", "first_name", true),
    column("last_name", "last_name", true),
    column("name", "first_name || ' ' || last_name", true),
    column("age", "age", false),
    column("condition", "condition", true),
    column("created_at", "created_at", false),
    column("updated_at", "updated_at", false),
];

const NOTE_COLUMNS: &[Column] = &[
    column("id", "id", false),
    column("therapist_id", "therapist_id", true),
    column("body", "body", true),
    column("created_at", "created_at", false),
];

enum SqlArg {
    Int(i64),
    Text(String),
}

/// WHERE and ORDER BY text plus the values bound to the WHERE placeholders
struct Clauses {
    filter_sql: String,
    order_sql: String,
    args: Vec<SqlArg>,
}

/// One table's paged SELECT
struct PagedSelect {
    select: &'static str,
    table: &'static str,
    columns: &'static [Column],
}

const PATIENT_SELECT: PagedSelect = PagedSelect {
    select: SELECT_PATIENT,
    table: "patients",
    columns: PATIENT_COLUMNS,
};

const NOTE_SELECT: PagedSelect = PagedSelect {
    select: SELECT_NOTE,
    table: "notes",
    columns: NOTE_COLUMNS,
};

fn lookup_failed(err: impl std::fmt::Display) -> QueryError {
    QueryError::LookupFailed(err.to_string())
}

fn sql_dir(dir: SortDir) -> &'static str {
    match dir {
        SortDir::Asc => "ASC",
        SortDir::Desc => "DESC",
    }
}

/// `%value%` with LIKE wildcards in `value` taken literally
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn clamp_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PagedSelect {
    fn column(&self, field: &str) -> Result<&'static Column, QueryError> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .ok_or_else(|| {
                let known: Vec<&str> = self.columns.iter().map(|c| c.field).collect();
                QueryError::InvalidPageRequest(format!(
                    "Unknown field '{}' (expected one of: {})",
                    field,
                    known.join(", ")
                ))
            })
    }

    fn condition(
        &self,
        filter: &Filter,
        args: &mut Vec<SqlArg>,
    ) -> Result<Option<String>, QueryError> {
        let column = self.column(&filter.field)?;
        if filter.is_noop() {
            return Ok(None);
        }

        // SQLite LIKE folds ASCII case
        let sql = match filter.op {
            FilterOp::Contains => {
                args.push(SqlArg::Text(like_pattern(filter.value.trim())));
                format!("({}) LIKE ? ESCAPE '\\'", column.expr)
            }
            FilterOp::Equals => {
                args.push(SqlArg::Text(filter.value.clone()));
                format!("CAST(({}) AS TEXT) = ?", column.expr)
            }
        };
        Ok(Some(sql))
    }

    /// Validate every named field and render the clauses
    ///
    /// `scope` restricts rows to `column = value` ahead of the caller's
    /// filters. Ties on the sort field break by `id` in the sort direction.
    fn clauses(
        &self,
        scope: Option<(&str, i64)>,
        request: &PageRequest,
    ) -> Result<Clauses, QueryError> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();

        if let Some((scope_column, value)) = scope {
            conditions.push(format!("{} = ?", scope_column));
            args.push(SqlArg::Int(value));
        }
        for filter in &request.filters {
            if let Some(sql) = self.condition(filter, &mut args)? {
                conditions.push(sql);
            }
        }

        let order_sql = match &request.sort {
            Some(sort) => {
                let column = self.column(&sort.field)?;
                let collate = if column.nocase { " COLLATE NOCASE" } else { "" };
                let dir = sql_dir(sort.dir);
                format!(" ORDER BY ({}){} {}, id {}", column.expr, collate, dir, dir)
            }
            None => " ORDER BY id ASC".to_string(),
        };

        let filter_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Ok(Clauses {
            filter_sql,
            order_sql,
            args,
        })
    }

    /// Rows of the requested page and the size of the filtered set
    async fn fetch(
        &self,
        pool: &SqlitePool,
        scope: Option<(&str, i64)>,
        request: &PageRequest,
    ) -> Result<(Vec<SqliteRow>, usize), QueryError> {
        let clauses = self.clauses(scope, request)?;

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table, clauses.filter_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &clauses.args {
            count_query = match arg {
                SqlArg::Int(v) => count_query.bind(*v),
                SqlArg::Text(s) => count_query.bind(s.clone()),
            };
        }
        let total = count_query.fetch_one(pool).await.map_err(lookup_failed)?;

        let page_sql = format!(
            "{}{}{} LIMIT ? OFFSET ?",
            self.select, clauses.filter_sql, clauses.order_sql
        );
        let mut page_query = sqlx::query(&page_sql);
        for arg in &clauses.args {
            page_query = match arg {
                SqlArg::Int(v) => page_query.bind(*v),
                SqlArg::Text(s) => page_query.bind(s.clone()),
            };
        }
        let rows = page_query
            .bind(clamp_i64(request.page_size))
            .bind(clamp_i64(request.offset()))
            .fetch_all(pool)
            .await
            .map_err(lookup_failed)?;

        Ok((rows, usize::try_from(total).unwrap_or(0)))
    }
}

/// The whole patient roster
pub struct PatientRoster {
    pool: SqlitePool,
}

impl PatientRoster {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PatientRoster {
    type Record = Patient;

    async fn query(&self, request: &PageRequest) -> Result<SourceResponse<Patient>, QueryError> {
        let (rows, total) = PATIENT_SELECT.fetch(&self.pool, None, request).await?;
        let data = rows
            .iter()
            .map(patient_from_row)
            .collect::<gmp_common::Result<Vec<_>>>()
            .map_err(lookup_failed)?;
        Ok(SourceResponse::Paged(Page::new(
            data,
            request.page,
            request.page_size,
            total,
        )))
    }
}

/// Notes of one patient
///
/// In legacy mode the source ignores paging and answers with every note,
/// newest first, as a bare list.
pub struct NoteLog {
    pool: SqlitePool,
    patient_id: i64,
    legacy: bool,
}

impl NoteLog {
    pub fn new(pool: SqlitePool, patient_id: i64) -> Self {
        Self {
            pool,
            patient_id,
            legacy: false,
        }
    }

    pub fn legacy(pool: SqlitePool, patient_id: i64) -> Self {
        Self {
            legacy: true,
            ..Self::new(pool, patient_id)
        }
    }
}

#[async_trait]
impl RecordSource for NoteLog {
    type Record = Note;

    async fn query(&self, request: &PageRequest) -> Result<SourceResponse<Note>, QueryError> {
        if self.legacy {
            let log = notes::list_notes(&self.pool, self.patient_id)
                .await
                .map_err(lookup_failed)?;
            return Ok(SourceResponse::Bare(log));
        }

        let scope = Some(("patient_id", self.patient_id));
        let (rows, total) = NOTE_SELECT.fetch(&self.pool, scope, request).await?;
        let data = rows
            .iter()
            .map(note_from_row)
            .collect::<gmp_common::Result<Vec<_>>>()
            .map_err(lookup_failed)?;
        Ok(SourceResponse::Paged(Page::new(
            data,
            request.page,
            request.page_size,
            total,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_pool, patients};
    use crate::models::{NewNote, NewPatient};
    use crate::query::QueryEngine;

    async fn add_patient(pool: &SqlitePool, external: &str, first: &str, last: &str) -> i64 {
        let patient = NewPatient {
            patient_id: external.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            age: Some(40),
            condition: None,
        };
        patients::insert_patient(pool, &patient).await.unwrap().unwrap().id
    }

    async fn roster(n: usize) -> SqlitePool {
        let pool = init_memory_pool().await.unwrap();
        for i in 1..=n {
            add_patient(&pool, &format!("P-{:03}", i), "Pat", &format!("Num{}", i)).await;
        }
        pool
    }

    async fn page_of(
        pool: &SqlitePool,
        request: &PageRequest,
    ) -> Result<Page<Patient>, QueryError> {
        QueryEngine::new(50)
            .page(&PatientRoster::new(pool.clone()), request)
            .await
    }

    fn ids(page: &Page<Patient>) -> Vec<i64> {
        page.data.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_ten_records_page_size_four() {
        let pool = roster(10).await;

        let mut pages = Vec::new();
        for p in 0..3 {
            pages.push(page_of(&pool, &PageRequest::new(p, 4)).await.unwrap());
        }

        assert_eq!(ids(&pages[0]), vec![1, 2, 3, 4]);
        assert_eq!(ids(&pages[1]), vec![5, 6, 7, 8]);
        assert_eq!(ids(&pages[2]), vec![9, 10]);
        assert!(pages.iter().all(|p| p.total == 10 && p.total_pages == 3));
        assert!(!pages[2].has_next);
        assert!(pages[2].has_prev);
    }

    #[tokio::test]
    async fn test_pages_partition_filtered_set() {
        let pool = roster(12).await;
        let request = |page| {
            PageRequest::new(page, 3)
                .with_filter(Filter::contains("name", "num1"))
                .sorted_by("updated_at", SortDir::Desc)
        };

        // num1 and num10..num12
        let mut seen = Vec::new();
        for page in 0..3 {
            let result = page_of(&pool, &request(page)).await.unwrap();
            assert_eq!(result.total, 4);
            seen.extend(ids(&result));
        }
        seen.sort();
        assert_eq!(seen, vec![1, 10, 11, 12]);
    }

    #[tokio::test]
    async fn test_filters_are_case_insensitive_and_conjunctive() {
        let pool = init_memory_pool().await.unwrap();
        add_patient(&pool, "P-001", "Dana", "Levi").await;
        add_patient(&pool, "P-002", "Dan", "Cohen").await;
        add_patient(&pool, "P-003", "Noa", "Levin").await;

        let by_name = PageRequest::new(0, 10).with_filter(Filter::contains("name", "LEVI"));
        assert_eq!(ids(&page_of(&pool, &by_name).await.unwrap()), vec![1, 3]);

        let both = by_name.with_filter(Filter::contains("patient_id", "003"));
        let page = page_of(&pool, &both).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(ids(&page), vec![3]);
    }

    #[tokio::test]
    async fn test_like_wildcards_match_literally() {
        let pool = init_memory_pool().await.unwrap();
        add_patient(&pool, "P-001", "Sean", "O_Neil").await;
        add_patient(&pool, "P-002", "Sean", "ONeil").await;

        let underscore = PageRequest::new(0, 10).with_filter(Filter::contains("last_name", "_"));
        assert_eq!(ids(&page_of(&pool, &underscore).await.unwrap()), vec![1]);

        let percent = PageRequest::new(0, 10).with_filter(Filter::contains("name", "%"));
        assert_eq!(page_of(&pool, &percent).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_equals_matches_whole_value_only() {
        let pool = init_memory_pool().await.unwrap();
        add_patient(&pool, "P-001", "Ada", "One").await;
        add_patient(&pool, "P-0010", "Ada", "Ten").await;

        let exact = PageRequest::new(0, 10).with_filter(Filter::equals("patient_id", "P-001"));
        assert_eq!(ids(&page_of(&pool, &exact).await.unwrap()), vec![1]);

        let padded = PageRequest::new(0, 10).with_filter(Filter::equals("patient_id", " P-001"));
        assert_eq!(page_of(&pool, &padded).await.unwrap().total, 0);

        let wrong_case =
            PageRequest::new(0, 10).with_filter(Filter::equals("patient_id", "p-001"));
        assert_eq!(page_of(&pool, &wrong_case).await.unwrap().total, 0);

        let numeric = PageRequest::new(0, 10).with_filter(Filter::equals("age", "40"));
        assert_eq!(page_of(&pool, &numeric).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_blank_filter_is_noop() {
        let pool = roster(5).await;
        let request = PageRequest::new(0, 10)
            .with_filter(Filter::contains("name", "  "))
            .with_filter(Filter::equals("patient_id", ""));
        assert_eq!(page_of(&pool, &request).await.unwrap().total, 5);
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let pool = roster(2).await;

        let bad_filter = PageRequest::new(0, 10).with_filter(Filter::contains("ssn", "1"));
        assert!(matches!(
            page_of(&pool, &bad_filter).await,
            Err(QueryError::InvalidPageRequest(_))
        ));

        // Blank values still name a field
        let blank_bad = PageRequest::new(0, 10).with_filter(Filter::contains("ssn", ""));
        assert!(page_of(&pool, &blank_bad).await.is_err());

        let bad_sort =
            PageRequest::new(0, 10).sorted_by("shoe_size; DROP TABLE patients", SortDir::Asc);
        assert!(matches!(
            page_of(&pool, &bad_sort).await,
            Err(QueryError::InvalidPageRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_ties_break_by_id_in_sort_direction() {
        let pool = roster(4).await;

        let asc = page_of(&pool, &PageRequest::new(0, 10).sorted_by("first_name", SortDir::Asc))
            .await
            .unwrap();
        let desc = page_of(&pool, &PageRequest::new(0, 10).sorted_by("first_name", SortDir::Desc))
            .await
            .unwrap();

        assert_eq!(ids(&asc), vec![1, 2, 3, 4]);
        assert_eq!(ids(&desc), vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_text_sort_ignores_case() {
        let pool = init_memory_pool().await.unwrap();
        add_patient(&pool, "P-001", "bob", "X").await;
        add_patient(&pool, "P-002", "Alice", "X").await;
        add_patient(&pool, "P-003", "carol", "X").await;

        let page = page_of(&pool, &PageRequest::new(0, 10).sorted_by("first_name", SortDir::Asc))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_repeat_requests_are_stable() {
        let pool = roster(7).await;
        let request = PageRequest::new(1, 2).sorted_by("first_name", SortDir::Asc);
        let a = page_of(&pool, &request).await.unwrap();
        let b = page_of(&pool, &request).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty() {
        let pool = roster(3).await;
        let page = page_of(&pool, &PageRequest::new(5, 2)).await.unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.page, 5);
        assert_eq!(page.total, 3);
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn test_largest_page_number_is_empty() {
        let pool = roster(3).await;
        let page = page_of(&pool, &PageRequest::new(usize::MAX, 4)).await.unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.page, usize::MAX);
        assert!(page.has_prev);
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn test_note_log_is_scoped_to_patient() {
        let pool = roster(2).await;
        for (patient_id, therapist) in [(1, "t-anna"), (2, "t-ben"), (1, "t-ben"), (1, "t-anna")] {
            let note = NewNote {
                therapist_id: therapist.to_string(),
                body: format!("note by {}", therapist),
            };
            notes::insert_note(&pool, patient_id, &note).await.unwrap();
        }

        let engine = QueryEngine::new(50);
        let newest_first = PageRequest::new(0, 2).sorted_by("created_at", SortDir::Desc);
        let page = engine
            .page(&NoteLog::new(pool.clone(), 1), &newest_first)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.iter().map(|n| n.id).collect::<Vec<_>>(), vec![4, 3]);
        assert!(page.has_next);

        let by_anna = PageRequest::new(0, 10).with_filter(Filter::contains("therapist_id", "ANNA"));
        let page = engine.page(&NoteLog::new(pool.clone(), 1), &by_anna).await.unwrap();
        assert_eq!(page.data.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 4]);

        let legacy = NoteLog::legacy(pool.clone(), 1)
            .query(&PageRequest::new(0, 1))
            .await
            .unwrap();
        match legacy {
            SourceResponse::Bare(list) => {
                assert_eq!(list.iter().map(|n| n.id).collect::<Vec<_>>(), vec![4, 3, 1]);
            }
            SourceResponse::Paged(_) => panic!("legacy log must answer with a bare list"),
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
        assert_eq!(like_pattern("levi"), "%levi%");
    }
}
