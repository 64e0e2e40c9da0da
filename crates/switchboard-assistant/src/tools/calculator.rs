//! Built-in calculator tool.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::schema::{ParamKind, ToolSchema};
use crate::tool::{Tool, ToolError, ToolOutput, ToolResult};

/// Evaluates basic arithmetic expressions.
///
/// Supports `+ - * /`, parentheses, and unary minus over floating-point
/// numbers. One action: `execute(input)`.
pub struct Calculator {
    schema: ToolSchema,
}

impl Calculator {
    /// Create the calculator tool.
    pub fn new() -> Self {
        let schema = ToolSchema::builder("calculator")
            .action(
                "execute",
                "Evaluate a basic arithmetic expression",
                |params| {
                    params
                        .property("input", ParamKind::String)
                        .describe("The expression to evaluate, e.g. \"2+2\"")
                        .required();
                },
            )
            .expect("calculator action definition is valid")
            .build()
            .expect("calculator schema is valid");

        Self { schema }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for Calculator {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, method: &str, arguments: &Map<String, Value>) -> ToolResult<ToolOutput> {
        if method != "execute" {
            return Err(ToolError::UnknownMethod(method.to_string()));
        }

        let input = arguments
            .get("input")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidArguments("'input' must be a string expression".to_string())
            })?;

        let value = evaluate(input).map_err(ToolError::Execution)?;
        Ok(ToolOutput::text(format!("{:?}", value)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expression Evaluation
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate an arithmetic expression.
///
/// Recursive descent over `+ - * /` with parentheses and unary minus.
fn evaluate(input: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: input.chars().filter(|c| !c.is_whitespace()).collect(),
        position: 0,
    };
    let value = parser.expression()?;
    if parser.position < parser.chars.len() {
        return Err(format!(
            "unexpected character '{}' at position {}",
            parser.chars[parser.position], parser.position
        ));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn expression(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                '+' => {
                    self.advance();
                    value += self.term()?;
                }
                '-' => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                '*' => {
                    self.advance();
                    value *= self.factor()?;
                }
                '/' => {
                    self.advance();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.advance();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.advance();
                let value = self.expression()?;
                match self.advance() {
                    Some(')') => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!(
                "unexpected character '{}' at position {}",
                c, self.position
            )),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.advance();
        }
        let literal: String = self.chars[start..self.position].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", literal))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arguments(input: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("input".to_string(), json!(input));
        map
    }

    #[test]
    fn test_evaluate_basics() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("10 - 4").unwrap(), 6.0);
        assert_eq!(evaluate("3 * 7").unwrap(), 21.0);
        assert_eq!(evaluate("9 / 2").unwrap(), 4.5);
    }

    #[test]
    fn test_evaluate_precedence_and_parens() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("-(2 + 3)").unwrap(), -5.0);
        assert_eq!(evaluate("1.5 * 2").unwrap(), 3.0);
    }

    #[test]
    fn test_evaluate_errors() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(2 + 3").is_err());
        assert!(evaluate("2 & 3").is_err());
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("").is_err());
    }

    #[tokio::test]
    async fn test_execute_formats_as_float() {
        let calculator = Calculator::new();
        let output = calculator
            .call("execute", &arguments("2+2"))
            .await
            .unwrap();
        assert_eq!(output.content.as_deref(), Some("4.0"));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_arguments() {
        let calculator = Calculator::new();
        let err = calculator.call("execute", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = calculator
            .call("execute", &arguments("nonsense"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let calculator = Calculator::new();
        let err = calculator
            .call("integrate", &arguments("x^2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownMethod(_)));
    }

    #[test]
    fn test_schema_advertises_execute() {
        let calculator = Calculator::new();
        let functions = calculator.schema().functions();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "calculator__execute");
        assert_eq!(
            functions[0].parameters["required"],
            json!(["input"])
        );
    }
}
