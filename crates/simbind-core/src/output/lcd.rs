// Simbind LCD Rendering
// Character LCD templates with `$` placeholders

/// Character LCD target.
///
/// Each template line may contain a run of `$` placeholders; the display
/// value is right-aligned into them. `escape_char` followed by `$` prints a
/// literal `$`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdDisplay {
    pub address: String,
    pub cols: usize,
    pub rows: usize,
    pub lines: Vec<String>,
    pub escape_char: Option<char>,
}

enum Cell {
    Literal(char),
    Placeholder,
}

impl LcdDisplay {
    pub fn new(address: impl Into<String>, cols: usize, rows: usize) -> Self {
        Self {
            address: address.into(),
            cols,
            rows,
            lines: Vec::new(),
            escape_char: None,
        }
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Render the value into exactly `rows` lines of `cols` characters
    pub fn render(&self, value: &str) -> Vec<String> {
        (0..self.rows)
            .map(|row| {
                let template = self.lines.get(row).map(String::as_str).unwrap_or("");
                self.render_line(template, value)
            })
            .collect()
    }

    /// Every cell lit, used by test mode
    pub fn test_pattern(&self) -> Vec<String> {
        vec!["8".repeat(self.cols); self.rows]
    }

    pub fn blank(&self) -> Vec<String> {
        vec![" ".repeat(self.cols); self.rows]
    }

    fn render_line(&self, template: &str, value: &str) -> String {
        let cells = self.parse_template(template);
        let slots = cells
            .iter()
            .filter(|c| matches!(c, Cell::Placeholder))
            .count();

        let value: Vec<char> = value.chars().collect();
        let fill: Vec<char> = if value.len() >= slots {
            value[value.len() - slots..].to_vec()
        } else {
            std::iter::repeat(' ')
                .take(slots - value.len())
                .chain(value.iter().copied())
                .collect()
        };

        let mut fill = fill.into_iter();
        let mut line: String = cells
            .iter()
            .map(|cell| match cell {
                Cell::Literal(ch) => *ch,
                Cell::Placeholder => fill.next().unwrap_or(' '),
            })
            .take(self.cols)
            .collect();

        let width = line.chars().count();
        if width < self.cols {
            line.extend(std::iter::repeat(' ').take(self.cols - width));
        }
        line
    }

    fn parse_template(&self, template: &str) -> Vec<Cell> {
        let mut cells = Vec::new();
        let mut chars = template.chars().peekable();
        while let Some(ch) = chars.next() {
            if Some(ch) == self.escape_char && chars.peek() == Some(&'$') {
                chars.next();
                cells.push(Cell::Literal('$'));
            } else if ch == '$' {
                cells.push(Cell::Placeholder);
            } else {
                cells.push(Cell::Literal(ch));
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcd(lines: &[&str]) -> LcdDisplay {
        LcdDisplay::new("0x27", 16, 2).with_lines(lines.iter().copied())
    }

    #[test]
    fn test_right_aligns_into_placeholders() {
        let display = lcd(&["ALT   $$$$$ ft", "HDG $$$"]);
        let lines = display.render("3500");
        assert_eq!(lines[0], "ALT    3500 ft  ");
        assert_eq!(lines[1], "HDG 500         ");
    }

    #[test]
    fn test_always_renders_all_rows() {
        let display = lcd(&["SPD $$$"]);
        let lines = display.render("250");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], " ".repeat(16));
    }

    #[test]
    fn test_truncates_to_cols() {
        let display = LcdDisplay::new("0x27", 8, 1).with_lines(["ABCDEFGHIJ $$"]);
        assert_eq!(display.render("42"), vec!["ABCDEFGH".to_string()]);
    }

    #[test]
    fn test_escaped_dollar() {
        let mut display = LcdDisplay::new("0x27", 10, 1).with_lines(["\\$ $$$"]);
        display.escape_char = Some('\\');
        assert_eq!(display.render("12"), vec!["$  12     ".to_string()]);
    }

    #[test]
    fn test_patterns() {
        let display = LcdDisplay::new("0x27", 4, 2);
        assert_eq!(display.test_pattern(), vec!["8888", "8888"]);
        assert_eq!(display.blank(), vec!["    ", "    "]);
    }
}
