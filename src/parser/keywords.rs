//! Fixed keyword sets used by the heuristic scanners.
//!
//! Matching is case-insensitive; delimited identifiers (`[Select]`) are never
//! keywords, so callers check [`super::is_delimited`] first.

/// Check if a word is a SQL keyword (to filter out from column detection)
pub fn is_sql_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "SELECT"
            | "FROM"
            | "WHERE"
            | "AND"
            | "OR"
            | "NOT"
            | "NULL"
            | "IS"
            | "IN"
            | "AS"
            | "ON"
            | "JOIN"
            | "LEFT"
            | "RIGHT"
            | "INNER"
            | "OUTER"
            | "CROSS"
            | "FULL"
            | "APPLY"
            | "INSERT"
            | "INTO"
            | "VALUES"
            | "UPDATE"
            | "SET"
            | "DELETE"
            | "MERGE"
            | "USING"
            | "MATCHED"
            | "CREATE"
            | "ALTER"
            | "DROP"
            | "TRUNCATE"
            | "TABLE"
            | "VIEW"
            | "INDEX"
            | "PROCEDURE"
            | "PROC"
            | "FUNCTION"
            | "TRIGGER"
            | "RETURNS"
            | "BEGIN"
            | "END"
            | "IF"
            | "ELSE"
            | "WHILE"
            | "BREAK"
            | "CONTINUE"
            | "RETURN"
            | "DECLARE"
            | "PRINT"
            | "THROW"
            | "TRY"
            | "CATCH"
            | "TRAN"
            | "TRANSACTION"
            | "COMMIT"
            | "ROLLBACK"
            | "MAX"
            | "PRIMARY"
            | "FOREIGN"
            | "REFERENCES"
            | "UNIQUE"
            | "CHECK"
            | "DEFAULT"
            | "CONSTRAINT"
            | "IDENTITY"
            | "NOCOUNT"
            | "COUNT"
            | "SUM"
            | "AVG"
            | "MIN"
            | "ISNULL"
            | "COALESCE"
            | "CAST"
            | "CONVERT"
            | "CASE"
            | "WHEN"
            | "THEN"
            | "EXEC"
            | "EXECUTE"
            | "GO"
            | "USE"
            | "DATABASE"
            | "SCHEMA"
            | "GRANT"
            | "REVOKE"
            | "DENY"
            | "ORDER"
            | "BY"
            | "GROUP"
            | "HAVING"
            | "DISTINCT"
            | "TOP"
            | "PERCENT"
            | "OFFSET"
            | "FETCH"
            | "NEXT"
            | "ROWS"
            | "ONLY"
            | "UNION"
            | "ALL"
            | "EXCEPT"
            | "INTERSECT"
            | "EXISTS"
            | "ANY"
            | "SOME"
            | "LIKE"
            | "BETWEEN"
            | "ASC"
            | "DESC"
            | "CLUSTERED"
            | "NONCLUSTERED"
            | "OUTPUT"
            | "READONLY"
            | "WITH"
            | "NOLOCK"
            | "OVER"
            | "PARTITION"
            | "COLLATE"
            | "SCOPE_IDENTITY"
    )
}

/// Built-in type names. These double as common column names (`Date`, `Text`),
/// so they are only treated as keywords where a type is expected.
pub fn is_type_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "INT"
            | "VARCHAR"
            | "NVARCHAR"
            | "CHAR"
            | "NCHAR"
            | "TEXT"
            | "NTEXT"
            | "BIT"
            | "TINYINT"
            | "SMALLINT"
            | "BIGINT"
            | "DECIMAL"
            | "NUMERIC"
            | "FLOAT"
            | "REAL"
            | "MONEY"
            | "SMALLMONEY"
            | "DATE"
            | "TIME"
            | "DATETIME"
            | "DATETIME2"
            | "SMALLDATETIME"
            | "DATETIMEOFFSET"
            | "UNIQUEIDENTIFIER"
            | "BINARY"
            | "VARBINARY"
            | "IMAGE"
            | "XML"
            | "SQL_VARIANT"
            | "ROWVERSION"
            | "GEOGRAPHY"
            | "GEOMETRY"
            | "HIERARCHYID"
    )
}

/// Row-leading words of a table body that introduce a constraint or index, not a column.
pub fn is_constraint_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "CONSTRAINT" | "PRIMARY" | "FOREIGN" | "CHECK" | "UNIQUE" | "INDEX"
    )
}

/// Words that begin a new T-SQL statement when they appear at the top level.
pub fn is_statement_start_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "SELECT"
            | "INSERT"
            | "UPDATE"
            | "DELETE"
            | "MERGE"
            | "WITH"
            | "DECLARE"
            | "SET"
            | "IF"
            | "ELSE"
            | "WHILE"
            | "BEGIN"
            | "END"
            | "RETURN"
            | "EXEC"
            | "EXECUTE"
            | "CREATE"
            | "ALTER"
            | "DROP"
            | "TRUNCATE"
            | "PRINT"
            | "THROW"
            | "RAISERROR"
            | "OPEN"
            | "CLOSE"
            | "FETCH"
            | "DEALLOCATE"
            | "COMMIT"
            | "ROLLBACK"
            | "GRANT"
            | "DENY"
            | "REVOKE"
            | "USE"
            | "BREAK"
            | "CONTINUE"
            | "WAITFOR"
    )
}

/// Keywords that end a table reference, so the word is never an alias.
pub fn is_alias_stop_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "ON" | "WHERE"
            | "INNER"
            | "LEFT"
            | "RIGHT"
            | "OUTER"
            | "CROSS"
            | "FULL"
            | "JOIN"
            | "APPLY"
            | "GROUP"
            | "ORDER"
            | "HAVING"
            | "UNION"
            | "EXCEPT"
            | "INTERSECT"
            | "WITH"
            | "AND"
            | "OR"
            | "NOT"
            | "SET"
            | "FROM"
            | "SELECT"
            | "INSERT"
            | "UPDATE"
            | "DELETE"
            | "MERGE"
            | "INTO"
            | "VALUES"
            | "WHEN"
            | "THEN"
            | "ELSE"
            | "END"
            | "CASE"
            | "FOR"
            | "OPTION"
            | "OUTPUT"
            | "USING"
            | "AS"
            | "PIVOT"
            | "UNPIVOT"
            | "RETURN"
            | "DECLARE"
            | "IF"
            | "BEGIN"
            | "EXEC"
            | "EXECUTE"
            | "GO"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert!(is_sql_keyword("select"));
        assert!(is_sql_keyword("Where"));
        assert!(!is_sql_keyword("EmployeeId"));
    }

    #[test]
    fn test_type_names_are_not_plain_keywords() {
        assert!(is_type_keyword("Date"));
        assert!(is_type_keyword("nvarchar"));
        assert!(!is_sql_keyword("Date"));
        assert!(!is_sql_keyword("Text"));
        assert!(!is_type_keyword("Name"));
    }

    #[test]
    fn test_constraint_keywords() {
        assert!(is_constraint_keyword("constraint"));
        assert!(is_constraint_keyword("PRIMARY"));
        assert!(!is_constraint_keyword("Name"));
    }

    #[test]
    fn test_alias_stop_keywords() {
        assert!(is_alias_stop_keyword("where"));
        assert!(is_alias_stop_keyword("Join"));
        assert!(!is_alias_stop_keyword("e"));
    }
}
