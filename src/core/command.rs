//! Executable commands: SQL text plus ordered parameters

use super::error::{DatabaseError, Result};
use super::parameter::{Parameter, ParameterDirection};
use super::type_tag::TypeTag;
use super::value::DbValue;
use serde::{Deserialize, Serialize};

/// How the command text is interpreted by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandKind {
    /// Plain SQL text
    #[default]
    Text,
    /// Name of a stored procedure
    StoredProcedure,
    /// Name of a table to read in full
    TableDirect,
}

/// Result-shape hint passed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandBehavior {
    #[default]
    Default,
    /// Only the first result set is read
    SingleResult,
    /// At most one row is read
    SingleRow,
    /// Only column metadata is needed
    SchemaOnly,
}

/// A SQL statement and its parameters, ready for one execution
///
/// Commands are consumed by the executor; build a new one per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    parameters: Vec<Parameter>,
    kind: CommandKind,
    behavior: CommandBehavior,
}

impl Command {
    /// Create a text command with no parameters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
            kind: CommandKind::Text,
            behavior: CommandBehavior::Default,
        }
    }

    /// Append one parameter
    pub fn with_param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Append parameters in the order given
    pub fn with_params<I: IntoIterator<Item = Parameter>>(mut self, parameters: I) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Set how the text is interpreted
    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the result-shape hint
    pub fn with_behavior(mut self, behavior: CommandBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a parameter by its full name (including the sigil)
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn behavior(&self) -> CommandBehavior {
        self.behavior
    }
}

/// Build a text command; parameter names are not checked against `sql`
///
/// ```
/// use rust_data_access::prelude::*;
///
/// let cmd = build_command(
///     "SELECT * FROM users WHERE id = @id",
///     [1i32.to_param("@id")],
/// );
/// assert_eq!(cmd.parameters().len(), 1);
/// ```
pub fn build_command<I>(sql: impl Into<String>, parameters: I) -> Command
where
    I: IntoIterator<Item = Parameter>,
{
    Command::new(sql).with_params(parameters)
}

/// Build a command with an explicit [`CommandKind`]
pub fn build_command_with_kind<I>(
    sql: impl Into<String>,
    kind: CommandKind,
    parameters: I,
) -> Command
where
    I: IntoIterator<Item = Parameter>,
{
    build_command(sql, parameters).with_kind(kind)
}

/// Build a single-parameter command, taking the parameter name from the text
///
/// The name is the first whitespace-separated token that starts with `@`.
/// Only suitable for statements with exactly one parameter written as a
/// standalone token; quoted literals, several parameters or a parameter
/// glued to punctuation (`(@id`) are not handled. Prefer [`build_command`]
/// with explicit names.
pub fn build_command_inferred(
    sql: impl Into<String>,
    type_tag: TypeTag,
    value: impl Into<DbValue>,
    direction: ParameterDirection,
) -> Result<Command> {
    let sql = sql.into();
    let name = sql
        .split_whitespace()
        .find(|token| token.starts_with('@'))
        .map(|token| token.trim_end_matches([';', ',', ')']).to_string())
        .ok_or_else(|| DatabaseError::ParameterNameNotFound(sql.clone()))?;

    let parameter = Parameter::new(name, type_tag, value).with_direction(direction);
    Ok(Command::new(sql).with_param(parameter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parameter::ToParam;

    #[test]
    fn test_build_command() {
        let sql = "SELECT * FROM users WHERE id = @id;";
        let param = 1i32.to_param("@id");

        let cmd = build_command(sql, [param.clone()]);

        assert_eq!(cmd.text(), sql);
        assert_eq!(cmd.parameters().len(), 1);
        assert_eq!(cmd.parameters()[0], param);
        assert_eq!(cmd.kind(), CommandKind::Text);
        assert_eq!(cmd.behavior(), CommandBehavior::Default);
    }

    #[test]
    fn test_parameters_keep_order() {
        let cmd = build_command(
            "INSERT INTO t (a, b, c) VALUES (@a, @b, @c)",
            vec![
                1i32.to_param("@a"),
                "two".to_param("@b"),
                3.0f64.to_param("@c"),
            ],
        );
        let names: Vec<&str> = cmd.parameters().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["@a", "@b", "@c"]);
        assert_eq!(cmd.parameter("@b").map(|p| p.type_tag()), Some(TypeTag::String));
    }

    #[test]
    fn test_build_command_with_kind() {
        let cmd = build_command_with_kind(
            "refresh_stats",
            CommandKind::StoredProcedure,
            Vec::<Parameter>::new(),
        );
        assert_eq!(cmd.kind(), CommandKind::StoredProcedure);
        assert!(cmd.parameters().is_empty());
    }

    #[test]
    fn test_inferred_parameter_name() -> Result<()> {
        let cmd = build_command_inferred(
            "DELETE FROM users WHERE id = @id",
            TypeTag::Int32,
            7i32,
            ParameterDirection::Input,
        )?;
        let param = &cmd.parameters()[0];
        assert_eq!(param.name(), "@id");
        assert_eq!(param.value(), &DbValue::Int32(7));

        let cmd = build_command_inferred(
            "SELECT * FROM users WHERE id = @id;",
            TypeTag::Int32,
            7i32,
            ParameterDirection::Input,
        )?;
        assert_eq!(cmd.parameters()[0].name(), "@id");
        Ok(())
    }

    #[test]
    fn test_inferred_without_parameter_token() {
        let result = build_command_inferred(
            "SELECT 1",
            TypeTag::Int32,
            1i32,
            ParameterDirection::Input,
        );
        assert!(matches!(result, Err(DatabaseError::ParameterNameNotFound(_))));
    }
}
