use libsql_bridge::{Bridge, BridgeError, ConnectionHandle, DatabaseHandle, OpenMode, Value};

fn seeded() -> Result<(Bridge, DatabaseHandle, ConnectionHandle), BridgeError> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;
    bridge.execute_batch(
        conn,
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL);
         INSERT INTO people (id, name, score) VALUES (1, 'alice', 1.5);
         INSERT INTO people (id, name, score) VALUES (2, 'bob', 2.5);
         INSERT INTO people (id, name, score) VALUES (3, 'carol', NULL);",
    )?;
    Ok((bridge, db, conn))
}

fn names(bridge: &Bridge, rows: libsql_bridge::RowsHandle) -> Result<Vec<String>, BridgeError> {
    let mut out = Vec::new();
    while let Some(row) = bridge.next_row(rows)? {
        let buffer = bridge.get_string(row, 0)?;
        out.push(bridge.buffer_text(buffer)?);
        bridge.free_buffer(buffer)?;
        bridge.free_row(row)?;
    }
    Ok(out)
}

#[test]
fn test2_reset_and_rebind_matches_fresh_prepare() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let sql = "SELECT name FROM people WHERE id >= ? ORDER BY id";

    let reused = bridge.prepare(conn, sql)?;
    bridge.bind_int(reused, 1, 1)?;
    let first = bridge.query_statement(reused, &[])?;
    assert_eq!(names(&bridge, first)?, ["alice", "bob", "carol"]);

    bridge.reset(reused)?;
    assert!(bridge.bound_value(reused, 1)?.is_none());
    bridge.bind_int(reused, 1, 2)?;
    let rerun = bridge.query_statement(reused, &[])?;

    let fresh = bridge.prepare(conn, sql)?;
    bridge.bind_int(fresh, 1, 2)?;
    let fresh_rows = bridge.query_statement(fresh, &[])?;

    assert_eq!(names(&bridge, rerun)?, names(&bridge, fresh_rows)?);
    // The reset released the first cursor.
    assert!(bridge.next_row(first).unwrap_err().is_stale());
    Ok(())
}

#[test]
fn test2_bindings_persist_and_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let stmt = bridge.prepare(conn, "INSERT INTO people (id, name, score) VALUES (?, ?, ?)")?;
    assert_eq!(bridge.parameter_count(stmt)?, 3);

    bridge.bind_int(stmt, 1, 10)?;
    bridge.bind_text(stmt, 2, "first")?;
    bridge.bind_text(stmt, 2, "dave")?;
    bridge.bind_float(stmt, 3, 0.25)?;
    assert_eq!(bridge.bound_value(stmt, 2)?, Some(Value::Text("dave".into())));
    assert_eq!(bridge.execute_statement(stmt, &[])?, 1);

    // Bindings survive execution; only position 1 changes.
    bridge.bind_int(stmt, 1, 11)?;
    assert_eq!(bridge.execute_statement(stmt, &[])?, 1);

    let rows = bridge.query(conn, "SELECT name FROM people WHERE id IN (10, 11) ORDER BY id", &[])?;
    assert_eq!(names(&bridge, rows)?, ["dave", "dave"]);
    Ok(())
}

#[test]
fn test2_unbound_positions_are_null() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let stmt = bridge.prepare(conn, "INSERT INTO people (id, name, score) VALUES (?, ?, ?)")?;
    bridge.bind_int(stmt, 1, 20)?;
    bridge.bind_null(stmt, 2)?;
    bridge.execute_statement(stmt, &[])?;

    let rows = bridge.query(conn, "SELECT name, score FROM people WHERE id = 20", &[])?;
    let row = bridge.next_row(rows)?.expect("inserted row");
    assert!(bridge.row_value(row, 0)?.is_null());
    assert!(bridge.row_value(row, 1)?.is_null());
    Ok(())
}

#[test]
fn test2_params_slice_replaces_bindings() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let stmt = bridge.prepare(conn, "SELECT name FROM people WHERE id = ? OR id = ? ORDER BY id")?;
    bridge.bind_int(stmt, 1, 1)?;
    bridge.bind_int(stmt, 2, 2)?;

    let rows = bridge.query_statement(stmt, &[Value::Integer(3)])?;
    // Position 2 was cleared by the replacement and is NULL.
    assert_eq!(names(&bridge, rows)?, ["carol"]);

    let err = bridge
        .query_statement(stmt, &[Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::BindError(_)));
    Ok(())
}

#[test]
fn test2_bind_position_out_of_range() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let stmt = bridge.prepare(conn, "SELECT name FROM people WHERE id = ?")?;
    assert!(matches!(bridge.bind_int(stmt, 0, 1), Err(BridgeError::BindError(_))));
    assert!(matches!(bridge.bind_int(stmt, 2, 1), Err(BridgeError::BindError(_))));
    bridge.bind_int(stmt, 1, 1)?;
    Ok(())
}

#[test]
fn test2_malformed_sql_is_a_syntax_error() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    match bridge.prepare(conn, "SELEC name FROM people") {
        Err(BridgeError::SyntaxError { native_message, .. }) => {
            assert!(native_message.contains("syntax error"), "{native_message}");
        }
        other => panic!("expected SyntaxError, got {other:?}"),
    }
    assert!(matches!(
        bridge.execute(conn, "INSERT INTO", &[]),
        Err(BridgeError::SyntaxError { .. })
    ));
    // The connection is still usable afterwards.
    assert_eq!(bridge.execute(conn, "DELETE FROM people WHERE id = 3", &[])?, 1);
    Ok(())
}

#[test]
fn test2_rerun_releases_previous_cursor() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let stmt = bridge.prepare(conn, "SELECT name FROM people ORDER BY id")?;
    let first = bridge.query_statement(stmt, &[])?;
    let row = bridge.next_row(first)?.expect("row");

    let second = bridge.query_statement(stmt, &[])?;
    assert!(bridge.next_row(first).unwrap_err().is_stale());
    assert!(bridge.row_value(row, 0).unwrap_err().is_stale());
    assert_eq!(names(&bridge, second)?, ["alice", "bob", "carol"]);

    bridge.free_statement(stmt)?;
    assert!(bridge.next_row(second).unwrap_err().is_stale());
    Ok(())
}

#[test]
fn test2_exhausted_cursor_stays_exhausted() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let rows = bridge.query(conn, "SELECT id FROM people WHERE id = 1", &[])?;
    assert!(bridge.next_row(rows)?.is_some());
    for _ in 0..3 {
        assert!(bridge.next_row(rows)?.is_none());
    }
    Ok(())
}

#[test]
fn test2_fetch_all_drains_into_result_set() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    let rows = bridge.query(conn, "SELECT id, name, score FROM people ORDER BY id", &[])?;
    let result_set = bridge.fetch_all(rows)?;
    assert_eq!(result_set.len(), 3);
    assert_eq!(result_set.column_names(), ["id", "name", "score"]);
    assert_eq!(result_set.results[1].get("name"), Some(&Value::Text("bob".into())));
    assert_eq!(result_set.results[0].get("score"), Some(&Value::Float(1.5)));
    assert!(result_set.results[2].get("score").is_some_and(Value::is_null));
    assert!(bridge.next_row(rows)?.is_none());
    Ok(())
}

#[test]
fn test2_step_failures_are_native_errors() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    bridge.execute(conn, "CREATE TABLE n(v INTEGER)", &[])?;
    let overflow = "INSERT INTO n VALUES (abs(-9223372036854775808))";

    let direct = bridge.execute(conn, overflow, &[]).unwrap_err();
    assert!(
        matches!(&direct, BridgeError::NativeError { code: 1, message } if message.contains("integer overflow")),
        "{direct:?}"
    );
    let stmt = bridge.prepare(conn, overflow)?;
    assert_eq!(bridge.execute_statement(stmt, &[]).unwrap_err(), direct);

    let batch = bridge.execute_batch(conn, overflow).unwrap_err();
    assert!(matches!(batch, BridgeError::NativeError { code: 1, .. }), "{batch:?}");
    assert!(matches!(
        bridge.execute_batch(conn, "CREATE TABL broken(a)"),
        Err(BridgeError::SyntaxError { .. })
    ));
    Ok(())
}

#[test]
fn test2_blank_sql_is_rejected_at_prepare() -> Result<(), Box<dyn std::error::Error>> {
    let (bridge, _db, conn) = seeded()?;
    for sql in ["", "  ;  ", "-- nothing here", "/* nor here */"] {
        assert!(
            matches!(bridge.prepare(conn, sql), Err(BridgeError::SyntaxError { .. })),
            "{sql:?}"
        );
        assert!(matches!(
            bridge.execute(conn, sql, &[]),
            Err(BridgeError::SyntaxError { .. })
        ));
        assert!(matches!(
            bridge.query(conn, sql, &[]),
            Err(BridgeError::SyntaxError { .. })
        ));
    }
    // An empty batch is simply nothing to do.
    bridge.execute_batch(conn, "")?;

    let stmt = bridge.prepare(conn, "-- leading comment\nSELECT name FROM people WHERE id = 1")?;
    let rows = bridge.query_statement(stmt, &[])?;
    assert_eq!(names(&bridge, rows)?, ["alice"]);
    Ok(())
}
