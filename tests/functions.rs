//! End-to-end tests for SQL-language functions: registration-time
//! validation, return shaping, and execution-context isolation across
//! nested and top-level invocations.

use funcdb::access::memory::Memory;
use funcdb::access::value::Values;
use funcdb::catalog::r#type::DataType;
use funcdb::catalog::r#type::Value;
use funcdb::error::Error;
use funcdb::error::Result;
use funcdb::error::SqlState;
use funcdb::session::Session;
use funcdb::sql::func::FunctionValue;
use funcdb::sql::func::ReturnType;
use funcdb::sql::plan::schema::FieldBuilder;
use funcdb::sql::plan::schema::Fields;

fn session() -> Session<Memory> {
    let _ = env_logger::builder().is_test(true).try_init();
    Session::new(Memory::new())
}

fn session_with_users() -> Result<Session<Memory>> {
    let mut session = session();
    session.execute_query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
    session.execute_query("INSERT INTO users (id, name) VALUES (1, 'alice'), (2, 'bob')")?;
    Ok(session)
}

fn record(fields: &[(&str, DataType)]) -> Fields {
    fields
        .iter()
        .map(|(name, datatype)| FieldBuilder::new(*name, datatype.clone()).build())
        .collect::<Vec<_>>()
        .into()
}

fn row(values: Vec<Value>) -> Values {
    Values::from(values)
}

#[test]
fn test_registration_rejects_multiple_statements() {
    let session = session();
    for body in ["", ";", "select 1; select 2"] {
        let err = session
            .create_function("f", vec![], ReturnType::Scalar(DataType::Integer), body)
            .unwrap_err();
        assert!(
            matches!(err, Error::StatementCount { .. }),
            "body {:?} should be rejected with a statement count error, got {:?}",
            body,
            err
        );
        // a failed registration leaves no function behind
        assert!(session.function("f").is_err());
    }
}

#[test]
fn test_registration_gates_statement_kind() -> Result<()> {
    let session = session_with_users()?;
    for body in [
        "INSERT INTO users (id, name) VALUES (3, 'mallory')",
        "CREATE TABLE t (id INTEGER PRIMARY KEY)",
    ] {
        let err = session
            .create_function("f", vec![], ReturnType::Void, body)
            .unwrap_err();
        assert!(
            matches!(err, Error::NotSupported(_)),
            "body {:?} should be rejected as unsupported, got {:?}",
            body,
            err
        );
    }

    // every row-producing form registers
    let bodies = [
        "select id from users",
        "select id from users union select id from users",
        "select id from users union all select id from users",
        "with ids as (select id from users) select * from ids",
        "with recursive r as (select 1 as n union all select n + 1 from r where n < 3) \
         select n from r",
        "values (1), (2)",
    ];
    for (i, body) in bodies.iter().enumerate() {
        session.create_function(&format!("f{}", i), vec![], ReturnType::Void, body)?;
    }
    Ok(())
}

#[test]
fn test_void_function_ignores_rows() -> Result<()> {
    let session = session_with_users()?;
    session.create_function("touch", vec![], ReturnType::Void, "select * from users")?;
    assert_eq!(session.call_function("touch", &[])?, FunctionValue::Null);
    Ok(())
}

#[test]
fn test_table_function_converts_every_row() -> Result<()> {
    let session = session_with_users()?;
    // the record declares a wider numeric type than the column
    session.create_function(
        "all_users",
        vec![],
        ReturnType::Table(record(&[("uid", DataType::Float), ("uname", DataType::String)])),
        "select * from users",
    )?;
    let out = session.call_function("all_users", &[])?;
    assert_eq!(
        out,
        FunctionValue::Table(vec![
            row(vec![Value::Float(1.0), Value::String("alice".to_string())]),
            row(vec![Value::Float(2.0), Value::String("bob".to_string())]),
        ])
    );
    Ok(())
}

#[test]
fn test_table_function_empty_result_is_not_null() -> Result<()> {
    let session = session_with_users()?;
    session.create_function(
        "no_users",
        vec![],
        ReturnType::Table(record(&[("id", DataType::Integer), ("name", DataType::String)])),
        "select * from users where id > 100",
    )?;
    // an empty row set is an empty table, not the absent marker
    assert_eq!(session.call_function("no_users", &[])?, FunctionValue::Table(vec![]));
    Ok(())
}

#[test]
fn test_scalar_function_first_row_or_null() -> Result<()> {
    let session = session_with_users()?;
    session.create_function(
        "first_id",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Float),
        "select id from users where id >= $1 order by id limit 1",
    )?;
    // the first row's single column, converted to the declared type
    assert_eq!(
        session.call_function("first_id", &[Value::Integer(2)])?,
        FunctionValue::Scalar(Value::Float(2.0))
    );
    // no matching first row yields a null value
    assert_eq!(
        session.call_function("first_id", &[Value::Integer(100)])?,
        FunctionValue::Scalar(Value::Null)
    );
    Ok(())
}

#[test]
fn test_return_type_mismatch_diagnostics() -> Result<()> {
    let session = session_with_users()?;

    // table expected: output columns are not convertible to the record
    let err = session
        .create_function(
            "bad_table",
            vec![],
            ReturnType::Table(record(&[("id", DataType::Boolean), ("name", DataType::String)])),
            "select * from users",
        )
        .unwrap_err();
    assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionTable));

    // scalar expected: more than one output column
    let err = session
        .create_function(
            "bad_scalar",
            vec![],
            ReturnType::Scalar(DataType::Integer),
            "select id, name from users",
        )
        .unwrap_err();
    assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionScalar));

    // scalar expected: single column of an inconvertible type
    let err = session
        .create_function(
            "bad_scalar2",
            vec![],
            ReturnType::Scalar(DataType::Integer),
            "select name from users",
        )
        .unwrap_err();
    assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionScalar));
    Ok(())
}

#[test]
fn test_nested_call_does_not_clobber_outer_parameters() -> Result<()> {
    let session = session();
    session.create_function(
        "inner_fn",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select $1 + 100",
    )?;
    // inner_fn runs with its own parameter binding; after it returns,
    // the trailing $1 must still observe the outer argument.
    session.create_function(
        "outer_fn",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select inner_fn($1 * 10) + $1",
    )?;
    // outer_fn(1) = inner_fn(10) + 1 = 110 + 1. A leaked inner binding
    // would read 10 for the trailing $1 and produce 120.
    assert_eq!(
        session.call_function("outer_fn", &[Value::Integer(1)])?,
        FunctionValue::Scalar(Value::Integer(111))
    );
    Ok(())
}

#[test]
fn test_deeply_nested_calls() -> Result<()> {
    let session = session();
    session.create_function(
        "f1",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select $1 + 1",
    )?;
    session.create_function(
        "f2",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select f1($1) + $1",
    )?;
    session.create_function(
        "f3",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select f2($1) + $1",
    )?;
    // f3(5) = f2(5) + 5 = (f1(5) + 5) + 5 = (6 + 5) + 5
    assert_eq!(
        session.call_function("f3", &[Value::Integer(5)])?,
        FunctionValue::Scalar(Value::Integer(16))
    );
    Ok(())
}

#[test]
fn test_unbounded_recursion_hits_depth_limit() -> Result<()> {
    let session = session();
    session.create_function(
        "looping",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select looping($1 + 1)",
    )?;
    let err = session.call_function("looping", &[Value::Integer(0)]).unwrap_err();
    assert!(err.to_string().contains("depth limit"));
    // the failure unwound through every frame; a later call starts clean
    session.create_function(
        "ok_fn",
        vec![],
        ReturnType::Scalar(DataType::Integer),
        "select 7",
    )?;
    assert_eq!(session.call_function("ok_fn", &[])?, FunctionValue::Scalar(Value::Integer(7)));
    Ok(())
}

#[test]
fn test_nested_call_inherits_callers_transaction() -> Result<()> {
    let mut session = session_with_users()?;
    session.create_function(
        "max_id",
        vec![],
        ReturnType::Scalar(DataType::Integer),
        "select id from users order by id desc limit 1",
    )?;

    session.begin()?;
    session.execute_query("INSERT INTO users (id, name) VALUES (9, 'carol')")?;
    // invoked from a statement, the function inherits the statement's
    // transaction and sees its uncommitted insert
    let rs = session.execute_query("SELECT max_id()")?;
    assert_eq!(rs.rows, vec![row(vec![Value::Integer(9)])]);
    // invoked with no enclosing context, the function runs against the
    // engine's current (committed) state and does not see the insert
    assert_eq!(
        session.call_function("max_id", &[])?,
        FunctionValue::Scalar(Value::Integer(2))
    );
    session.rollback()?;

    assert_eq!(
        session.call_function("max_id", &[])?,
        FunctionValue::Scalar(Value::Integer(2))
    );
    Ok(())
}

#[test]
fn test_spec_example_scenarios() -> Result<()> {
    let mut session = session_with_users()?;

    // body `select $1 + $2`, args (int, int), return int
    session.create_function(
        "add2",
        vec![DataType::Integer, DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select $1 + $2",
    )?;
    assert_eq!(
        session.call_function("add2", &[Value::Integer(2), Value::Integer(3)])?,
        FunctionValue::Scalar(Value::Integer(5))
    );

    // body `select * from t`, returns the table's rows at call time
    session.create_function(
        "snapshot",
        vec![],
        ReturnType::Table(record(&[("id", DataType::Integer), ("name", DataType::String)])),
        "select * from users",
    )?;
    let before = session.call_function("snapshot", &[])?;
    assert!(matches!(&before, FunctionValue::Table(rows) if rows.len() == 2));

    session.execute_query("INSERT INTO users (id, name) VALUES (3, 'carol')")?;
    let after = session.call_function("snapshot", &[])?;
    assert!(
        matches!(&after, FunctionValue::Table(rows) if rows.len() == 3),
        "the compiled plan is reused, the data is read at call time"
    );
    Ok(())
}

#[test]
fn test_functions_compose_with_statements() -> Result<()> {
    let mut session = session_with_users()?;
    session.create_function(
        "add2",
        vec![DataType::Integer, DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select $1 + $2",
    )?;
    let rs = session.execute_query("SELECT name FROM users WHERE id = add2(0, 1)")?;
    assert_eq!(rs.rows, vec![row(vec![Value::String("alice".to_string())])]);

    // a builtin scalar function and a defined function in one expression
    let rs = session.execute_query("SELECT upper(name) FROM users WHERE id = add2(1, 1)")?;
    assert_eq!(rs.rows, vec![row(vec![Value::String("BOB".to_string())])]);
    Ok(())
}

#[test]
fn test_recursive_cte_function_body() -> Result<()> {
    let session = session();
    session.create_function(
        "count_to",
        vec![DataType::Integer],
        ReturnType::Table(record(&[("n", DataType::Integer)])),
        "with recursive r as (select 1 as n union all select n + 1 from r where n < $1) \
         select n from r order by n",
    )?;
    let out = session.call_function("count_to", &[Value::Integer(4)])?;
    assert_eq!(
        out,
        FunctionValue::Table(vec![
            row(vec![Value::Integer(1)]),
            row(vec![Value::Integer(2)]),
            row(vec![Value::Integer(3)]),
            row(vec![Value::Integer(4)]),
        ])
    );
    Ok(())
}

#[test]
fn test_union_bodies_dedup_per_declaration() -> Result<()> {
    let session = session();
    session.create_function(
        "distinct_rows",
        vec![],
        ReturnType::Table(record(&[("n", DataType::Integer)])),
        "select 1 union select 1",
    )?;
    session.create_function(
        "all_rows",
        vec![],
        ReturnType::Table(record(&[("n", DataType::Integer)])),
        "select 1 union all select 1",
    )?;
    assert_eq!(
        session.call_function("distinct_rows", &[])?,
        FunctionValue::Table(vec![row(vec![Value::Integer(1)])])
    );
    assert_eq!(
        session.call_function("all_rows", &[])?,
        FunctionValue::Table(vec![
            row(vec![Value::Integer(1)]),
            row(vec![Value::Integer(1)]),
        ])
    );
    Ok(())
}

#[test]
fn test_table_function_rejected_in_expressions() -> Result<()> {
    let mut session = session_with_users()?;
    session.create_function(
        "all_ids",
        vec![],
        ReturnType::Table(record(&[("id", DataType::Integer)])),
        "select id from users",
    )?;
    let err = session.execute_query("SELECT all_ids()").unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    Ok(())
}

#[test]
fn test_runtime_errors_abort_single_invocation() -> Result<()> {
    let session = session();
    session.create_function(
        "divide",
        vec![DataType::Integer, DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "select $1 / $2",
    )?;
    let err = session.call_function("divide", &[Value::Integer(1), Value::Integer(0)]);
    assert!(err.is_err());
    // the function stays usable after a failed call
    assert_eq!(
        session.call_function("divide", &[Value::Integer(6), Value::Integer(3)])?,
        FunctionValue::Scalar(Value::Integer(2))
    );
    Ok(())
}

#[test]
fn test_values_body() -> Result<()> {
    let session = session();
    session.create_function(
        "pairs",
        vec![],
        ReturnType::Table(record(&[("a", DataType::Integer), ("b", DataType::String)])),
        "values (1, 'a'), (2, 'b')",
    )?;
    assert_eq!(
        session.call_function("pairs", &[])?,
        FunctionValue::Table(vec![
            row(vec![Value::Integer(1), Value::String("a".to_string())]),
            row(vec![Value::Integer(2), Value::String("b".to_string())]),
        ])
    );
    Ok(())
}

#[test]
fn test_parameterized_values_body() -> Result<()> {
    let session = session();
    session.create_function(
        "echo",
        vec![DataType::Integer],
        ReturnType::Scalar(DataType::Integer),
        "values ($1)",
    )?;
    assert_eq!(
        session.call_function("echo", &[Value::Integer(13)])?,
        FunctionValue::Scalar(Value::Integer(13))
    );
    Ok(())
}
