//! Property-based keyset pagination over random SQLite fixtures.
//!
//! Walking pages forward from the start, or backward from the end, must
//! visit every row exactly once in the full query's order, whatever the page
//! size, duplicate sort keys, or nulls.

use proptest::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tscribe_query::{Dialect, OrderBy, PageDirection, PagePlan, PageRequest, ScalarValue};

type Fixture = Vec<(Option<i64>, Option<String>)>;

fn to_sql(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => Value::Integer(i64::from(*b)),
        ScalarValue::Int(i) => Value::Integer(*i),
        ScalarValue::Float(f) => Value::Real(*f),
        ScalarValue::Text(s) => Value::Text(s.clone()),
    }
}

fn load(rows: &Fixture) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE transcripts (transcript_id TEXT, score INTEGER, model TEXT)")
        .unwrap();
    for (i, (score, model)) in rows.iter().enumerate() {
        conn.execute(
            "INSERT INTO transcripts VALUES (?1, ?2, ?3)",
            rusqlite::params![format!("t{i:03}"), score, model],
        )
        .unwrap();
    }
    conn
}

type Fetched = (String, Option<i64>, Option<String>);

fn fetch(conn: &Connection, plan: &PagePlan, limit: Option<usize>) -> Vec<Fetched> {
    let compiled = plan.where_sql(Dialect::Sqlite).unwrap();
    let mut sql = format!(
        "SELECT transcript_id, score, model FROM transcripts {} {}",
        compiled.where_clause(),
        plan.order_sql()
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    let mut stmt = conn.prepare(&sql).unwrap();
    let rows = stmt
        .query_map(params_from_iter(compiled.params.iter().map(to_sql)), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    rows
}

fn walk(conn: &Connection, order: &[OrderBy], first: PageRequest, max_pages: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut request = first;
    for _ in 0..max_pages {
        let plan = PagePlan::new(None, order, &request).unwrap();
        let rows = fetch(conn, &plan, Some(plan.limit));
        let page = plan.finish(rows, 0, |(id, score, model)| {
            plan.cursor_for(|column| match column {
                "transcript_id" => ScalarValue::Text(id.clone()),
                "score" => ScalarValue::from(*score),
                "model" => ScalarValue::from(model.clone()),
                _ => ScalarValue::Null,
            })
        });
        let ids = page.items.into_iter().map(|(id, _, _)| id);
        match request.direction {
            PageDirection::Forward => seen.extend(ids),
            PageDirection::Backward => {
                let mut front: Vec<String> = ids.collect();
                front.append(&mut seen);
                seen = front;
            }
        }
        match page.next_cursor {
            Some(cursor) => request = request.next(cursor),
            None => return seen,
        }
    }
    panic!("pagination did not terminate within {max_pages} pages");
}

fn fixture_strategy() -> impl Strategy<Value = Fixture> {
    prop::collection::vec(
        (
            prop::option::of(0i64..4),
            prop::option::of(prop_oneof![Just("a".to_string()), Just("b".to_string())]),
        ),
        0..24,
    )
}

fn order_strategy() -> impl Strategy<Value = Vec<OrderBy>> {
    prop_oneof![
        Just(vec![]),
        Just(vec![OrderBy::desc("score")]),
        Just(vec![OrderBy::asc("score")]),
        Just(vec![OrderBy::asc("model"), OrderBy::desc("score")]),
        Just(vec![OrderBy::desc("model"), OrderBy::asc("score")]),
        Just(vec![OrderBy::desc("transcript_id")]),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn forward_and_backward_walks_cover_every_row(
        rows in fixture_strategy(),
        order in order_strategy(),
        limit in 1usize..7,
    ) {
        let conn = load(&rows);
        let full = PagePlan::new(None, &order, &PageRequest::first(usize::MAX)).unwrap();
        let expected: Vec<String> = fetch(&conn, &full, None).into_iter().map(|(id, _, _)| id).collect();
        prop_assert_eq!(expected.len(), rows.len());

        let max_pages = rows.len() + 2;
        let forward = walk(&conn, &order, PageRequest::first(limit), max_pages);
        prop_assert_eq!(&forward, &expected);

        let backward = walk(&conn, &order, PageRequest::last(limit), max_pages);
        prop_assert_eq!(&backward, &expected);
    }
}
