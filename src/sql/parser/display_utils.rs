use std::fmt::Display;
use std::fmt::Formatter;

/// Displays a slice of `Display` items joined with commas.
pub fn display_comma_separated<T: Display>(items: &[T]) -> DisplaySeparated<'_, T> {
    DisplaySeparated { items, sep: ", " }
}

/// Displays a slice of `Display` items joined with dots.
pub fn display_dot_separated<T: Display>(items: &[T]) -> DisplaySeparated<'_, T> {
    DisplaySeparated { items, sep: "." }
}

pub struct DisplaySeparated<'a, T: Display> {
    items: &'a [T],
    sep: &'static str,
}

impl<T: Display> Display for DisplaySeparated<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut delim = "";
        for item in self.items {
            f.write_str(delim)?;
            delim = self.sep;
            item.fmt(f)?;
        }
        Ok(())
    }
}
