use libsql_bridge::{Bridge, BridgeError, HandleKind, OpenMode, StatementState, Value, ValueType};

#[test]
fn test1_create_insert_select_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;

    bridge.execute(conn, "CREATE TABLE t(a INTEGER, b TEXT)", &[])?;
    let affected = bridge.execute(
        conn,
        "INSERT INTO t VALUES (?, ?)",
        &[Value::Integer(42), Value::Text("x".into())],
    )?;
    assert_eq!(affected, 1);

    let stmt = bridge.prepare(conn, "SELECT a, b FROM t")?;
    let rows = bridge.query_statement(stmt, &[])?;
    assert_eq!(bridge.column_count(rows)?, 2);
    assert_eq!(bridge.column_name(rows, 0)?, "a");
    assert_eq!(bridge.column_name(rows, 1)?, "b");

    let row = bridge.next_row(rows)?.expect("one row");
    assert_eq!(bridge.get_int(row, 0)?, 42);
    let text = bridge.get_string(row, 1)?;
    assert_eq!(bridge.buffer_text(text)?, "x");
    assert_eq!(bridge.row_column_type(row, 0)?, ValueType::Integer);

    assert!(bridge.next_row(rows)?.is_none());

    bridge.free_buffer(text)?;
    bridge.free_row(row)?;
    bridge.free_rows(rows)?;
    bridge.free_statement(stmt)?;
    bridge.disconnect(conn)?;
    bridge.close_database(db)?;
    assert_eq!(bridge.live_handles(), 0);
    Ok(())
}

#[test]
fn test1_double_release_is_stale_for_every_kind() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;
    bridge.execute(conn, "CREATE TABLE t(b BLOB)", &[])?;
    bridge.execute(conn, "INSERT INTO t VALUES (x'0102')", &[])?;
    let stmt = bridge.prepare(conn, "SELECT b FROM t")?;
    let rows = bridge.query_statement(stmt, &[])?;
    let row = bridge.next_row(rows)?.expect("one row");
    let buffer = bridge.get_blob(row, 0)?;

    bridge.free_buffer(buffer)?;
    assert!(bridge.free_buffer(buffer).unwrap_err().is_stale());
    bridge.free_row(row)?;
    assert!(bridge.free_row(row).unwrap_err().is_stale());
    bridge.free_rows(rows)?;
    assert!(bridge.free_rows(rows).unwrap_err().is_stale());
    bridge.free_statement(stmt)?;
    assert!(bridge.free_statement(stmt).unwrap_err().is_stale());
    bridge.disconnect(conn)?;
    assert!(bridge.disconnect(conn).unwrap_err().is_stale());
    bridge.close_database(db)?;
    assert!(bridge.close_database(db).unwrap_err().is_stale());
    Ok(())
}

#[test]
fn test1_closing_database_invalidates_descendants() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;
    bridge.execute(conn, "CREATE TABLE t(a INTEGER)", &[])?;
    bridge.execute(conn, "INSERT INTO t VALUES (1), (2)", &[])?;
    let stmt = bridge.prepare(conn, "SELECT a FROM t")?;
    let rows = bridge.query_statement(stmt, &[])?;
    let row = bridge.next_row(rows)?.expect("first row");

    bridge.close_database(db)?;

    assert!(bridge.get_int(row, 0).unwrap_err().is_stale());
    assert!(bridge.next_row(rows).unwrap_err().is_stale());
    assert!(bridge.bind_int(stmt, 1, 1).unwrap_err().is_stale());
    assert!(bridge.execute(conn, "SELECT 1", &[]).unwrap_err().is_stale());
    assert!(bridge.connect(db).unwrap_err().is_stale());
    assert_eq!(bridge.live_handles(), 0);
    Ok(())
}

#[test]
fn test1_handles_of_the_wrong_kind_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let other = Bridge::new()?;
    // A token from another bridge never resolves here.
    assert!(other.connect(db).unwrap_err().is_stale());
    assert_eq!(bridge.children(db)?.len(), 0);

    let conn = bridge.connect(db)?;
    let children = bridge.children(db)?;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].kind(), HandleKind::Connection);
    bridge.release(conn)?;
    assert!(bridge.children(db)?.is_empty());
    Ok(())
}

#[test]
fn test1_guard_releases_on_scope_exit() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    {
        let conn = bridge.guard(bridge.connect(db)?);
        bridge.execute(*conn, "CREATE TABLE t(a INTEGER)", &[])?;
        assert_eq!(bridge.live_handles(), 2);
    }
    assert_eq!(bridge.live_handles(), 1);

    // Releasing early through another route leaves the guard with nothing to do.
    {
        let conn = bridge.guard(bridge.connect(db)?);
        bridge.disconnect(*conn)?;
    }
    let kept = bridge.guard(bridge.connect(db)?).into_inner();
    assert_eq!(bridge.live_handles(), 2);
    bridge.disconnect(kept)?;
    bridge.close_database(db)?;
    Ok(())
}

#[test]
fn test1_statement_state_follows_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;
    bridge.execute(conn, "CREATE TABLE t(a INTEGER)", &[])?;

    let stmt = bridge.prepare(conn, "INSERT INTO t VALUES (?)")?;
    assert_eq!(bridge.statement_state(stmt)?, StatementState::Created);
    assert_eq!(bridge.statement_sql(stmt)?, "INSERT INTO t VALUES (?)");
    bridge.bind_int(stmt, 1, 7)?;
    assert_eq!(bridge.statement_state(stmt)?, StatementState::Bound);
    bridge.execute_statement(stmt, &[])?;
    assert_eq!(bridge.statement_state(stmt)?, StatementState::Executed);
    bridge.reset(stmt)?;
    assert_eq!(bridge.statement_state(stmt)?, StatementState::Reset);
    bridge.free_statement(stmt)?;
    assert!(matches!(
        bridge.statement_state(stmt),
        Err(BridgeError::StaleHandle(_))
    ));
    Ok(())
}

#[test]
fn test1_prepared_scenario_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Bridge::new()?;
    let db = bridge.open(":memory:", OpenMode::Memory)?;
    let conn = bridge.connect(db)?;

    let create = bridge.prepare(conn, "CREATE TABLE t(a INTEGER, b TEXT)")?;
    bridge.execute_statement(create, &[])?;

    let insert = bridge.prepare(conn, "INSERT INTO t VALUES (?, ?)")?;
    bridge.bind(insert, 1, Value::Integer(42))?;
    bridge.bind(insert, 2, Value::Text("x".into()))?;
    assert_eq!(bridge.execute_statement(insert, &[])?, 1);
    assert_eq!(bridge.changes(conn)?, 1);
    assert_eq!(bridge.last_insert_rowid(conn)?, 1);

    let select = bridge.prepare(conn, "SELECT a,b FROM t")?;
    let rows = bridge.query_statement(select, &[])?;
    let row = bridge.next_row(rows)?.expect("inserted row");
    assert_eq!(bridge.row_value(row, 0)?, Value::Integer(42));
    assert_eq!(bridge.row_value(row, 1)?, Value::Text("x".into()));
    assert!(bridge.next_row(rows)?.is_none());
    Ok(())
}
