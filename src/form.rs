#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub label: &'static str,
    pub value: String,
    pub secret: bool,
}

impl Field {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            secret: false,
        }
    }

    pub fn secret(label: &'static str) -> Self {
        Self {
            secret: true,
            ..Self::new(label)
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn display(&self) -> String {
        if self.secret {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pub title: &'static str,
    pub fields: Vec<Field>,
    pub focus: usize,
}

impl Form {
    pub fn new(title: &'static str, fields: Vec<Field>) -> Self {
        Self {
            title,
            fields,
            focus: 0,
        }
    }

    pub fn value(&self, index: usize) -> &str {
        self.fields.get(index).map(|f| f.value.as_str()).unwrap_or("")
    }

    pub fn next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    pub fn push(&mut self, c: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.push(c);
        }
    }

    pub fn pop(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.pop();
        }
    }

    /// Whether every field has non-blank text; drives the submit control.
    pub fn is_filled(&self) -> bool {
        self.fields.iter().all(|f| !f.value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_goes_to_focused_field() {
        let mut form = Form::new("t", vec![Field::new("a"), Field::secret("b")]);
        form.push('x');
        form.next();
        form.push('y');
        form.push('z');
        form.pop();
        assert_eq!(form.value(0), "x");
        assert_eq!(form.value(1), "y");
        assert_eq!(form.fields[1].display(), "*");
        form.next();
        assert_eq!(form.focus, 0);
        form.prev();
        assert_eq!(form.focus, 1);
    }

    #[test]
    fn filled_ignores_whitespace() {
        let form = Form::new("t", vec![Field::new("a").with_value(" "), Field::new("b").with_value("v")]);
        assert!(!form.is_filled());
    }
}
