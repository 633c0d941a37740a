//! Tests for query validation

use crate::validator::{QueryValidator, normalize};
use crate::Rejection;
use pretty_assertions::assert_eq;

#[test]
fn test_accepts_simple_select() {
    let validated = QueryValidator::new().validate("SELECT 1").unwrap();
    assert_eq!(validated.statement_count, 1);
    assert!(!validated.changes_database);
}

#[test]
fn test_accepts_tsql_forms() {
    let validator = QueryValidator::new();
    for sql in [
        "SELECT TOP 10 name FROM sys.databases ORDER BY name",
        "SELECT * FROM [dbo].[Orders] WHERE [id] = 5",
        "UPDATE dbo.Orders SET status = 'shipped' WHERE id = 7",
        "INSERT INTO dbo.Audit (msg) VALUES ('x'); SELECT COUNT(*) FROM dbo.Audit",
    ] {
        assert!(validator.validate(sql).is_ok(), "expected {:?} to be accepted", sql);
    }
}

#[test]
fn test_use_statement_marks_database_change() {
    let validated = QueryValidator::new()
        .validate("USE inventory; SELECT 1")
        .unwrap();
    assert_eq!(validated.statement_count, 2);
    assert!(validated.changes_database);
}

#[test]
fn test_rejects_invalid_syntax() {
    let validator = QueryValidator::new();
    for sql in ["SELEC 1", "SELECT * FROM", "UPDATE SET"] {
        match validator.validate(sql) {
            Err(Rejection::SyntaxInvalid(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected SyntaxInvalid for {:?}, got {:?}", sql, other),
        }
    }
}

#[test]
fn test_rejects_input_without_statements() {
    assert!(matches!(
        QueryValidator::new().validate(";"),
        Err(Rejection::SyntaxInvalid(_))
    ));
}

#[test]
fn test_denylist_matches_any_casing_and_spacing() {
    let validator = QueryValidator::new();
    let cases = [
        ("DROP DATABASE prod", "drop database"),
        ("drop   database\n\tprod", "drop database"),
        ("dRoP uSeR alice", "drop user"),
        ("DROP LOGIN bob", "drop login"),
        ("EXEC master..xp_cmdshell 'dir'", "xp_cmdshell"),
        ("EXEC sp_configure 'show advanced options', 1", "sp_configure"),
    ];
    for (sql, phrase) in cases {
        assert_eq!(
            validator.validate(sql),
            Err(Rejection::Denylisted(phrase.to_string())),
            "for {:?}",
            sql
        );
    }
}

#[test]
fn test_denylist_wins_over_unparseable_text() {
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    let validator = QueryValidator::new();
    for sql in ["xp_cmdshell 'dir'", "EXEC xp_cmdshell 'dir' (("] {
        assert!(Parser::parse_sql(&MsSqlDialect {}, sql).is_err(), "{:?} parsed", sql);
        assert_eq!(
            validator.validate(sql),
            Err(Rejection::Denylisted("xp_cmdshell".to_string())),
            "for {:?}",
            sql
        );
    }
}

#[test]
fn test_denylist_is_substring_match() {
    // Phrases inside literals are blocked too
    assert_eq!(
        QueryValidator::denylisted_phrase("SELECT 'please do not drop database x' AS note"),
        Some("drop database")
    );
    assert_eq!(QueryValidator::denylisted_phrase("SELECT dropped_user FROM t"), None);
}

#[test]
fn test_normalize_collapses_whitespace() {
    assert_eq!(normalize("  SELECT\n\t*   FROM  T  "), "select * from t");
    assert_eq!(normalize(""), "");
}
