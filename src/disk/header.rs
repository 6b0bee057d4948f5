//! The column header row of a parted report, and the fixed-width records it describes.

pub const NUMBER: &str = "Number";
pub const START: &str = "Start";
pub const END: &str = "End";
pub const SIZE: &str = "Size";
pub const FILE_SYSTEM: &str = "File system";
pub const NAME: &str = "Name";
pub const FLAGS: &str = "Flags";
/// Only present on msdos tables, where it holds primary/extended/logical.
pub const TYPE: &str = "Type";

/// parted's only multi-word header begins with this word.
const FILE: &str = "File";

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name:  String,
    /// Characters from the start of this column to the start of the next.
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    /// Collecting the characters of a column name.
    Accumulating,
    /// Counting the spaces that pad a column name out to its field width.
    Padding,
}

/// The field widths of a report, in the order the columns appear.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns(Vec<Column>);

impl Columns {
    /// Measures each column of a header row such as
    /// `Number  Start   End     Size    File system  Name  Flags`.
    ///
    /// Names can't be split on whitespace, because "File system" holds a space.
    pub fn parse(row: &str) -> Columns {
        let mut columns = Vec::new();
        let mut state = State::Accumulating;
        let mut name = String::new();
        let mut padding = 0;

        for character in row.trim_end_matches(|c: char| c == '\n' || c == '\r').chars() {
            match (state, character) {
                (State::Accumulating, ' ') if name == FILE => name.push(' '),
                (State::Accumulating, ' ') => {
                    state = State::Padding;
                    padding = 1;
                }
                (State::Accumulating, character) => name.push(character),
                (State::Padding, ' ') => padding += 1,
                (State::Padding, character) => {
                    let width = name.chars().count() + padding;
                    columns.push(Column { name, width });
                    name = character.to_string();
                    padding = 0;
                    state = State::Accumulating;
                }
            }
        }

        if !name.is_empty() {
            let width = name.chars().count() + padding;
            columns.push(Column { name, width });
        }

        Columns(columns)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> { self.0.iter() }

    pub fn width(&self, name: &str) -> Option<usize> {
        self.0.iter().find(|column| column.name == name).map(|column| column.width)
    }

    pub fn contains(&self, name: &str) -> bool { self.width(name).is_some() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Slices a record into one field per column.
    ///
    /// Slices past the end of the line are clamped. When a line ends inside a column, the
    /// rest of the line belongs to that column and the columns after it are left empty.
    /// The last column always takes the rest of the line.
    pub fn slice<'a>(&'a self, line: &'a str) -> Record<'a> {
        let bytes = line.trim_end_matches(|c: char| c == '\n' || c == '\r').as_bytes();
        let length = bytes.len();
        let text = |from: usize, to: usize| -> String {
            let from = from.min(length);
            let to = to.min(length).max(from);
            String::from_utf8_lossy(&bytes[from..to]).trim().to_owned()
        };

        let mut fields = Vec::with_capacity(self.0.len());
        let mut offset = 0;
        let last = self.0.len().saturating_sub(1);

        for (index, column) in self.0.iter().enumerate() {
            if offset >= length {
                fields.push((column.name.as_str(), String::new()));
            } else if index == last || offset + column.width >= length {
                fields.push((column.name.as_str(), text(offset, length)));
                offset = length;
            } else {
                fields.push((column.name.as_str(), text(offset, offset + column.width)));
                offset += column.width;
            }
        }

        Record { fields }
    }
}

/// The fields of one report line, keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    fields: Vec<(&'a str, String)>,
}

impl<'a> Record<'a> {
    /// The trimmed text of a column, or an empty string if the header lacks that column.
    pub fn get(&self, column: &str) -> &str {
        self.fields
            .iter()
            .find(|(name, _)| *name == column)
            .map_or("", |(_, value)| value.as_str())
    }
}
