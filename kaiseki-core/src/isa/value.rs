use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueMap {
    width: usize,
    symbols: BTreeMap<String, String>,
}

impl ValueMap {
    pub fn new(width: usize, symbols: BTreeMap<String, String>) -> Self {
        Self { width, symbols }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn lookup(&self, raw: u32) -> Option<&str> {
        let key = format!("{:0width$b}", raw, width = self.width);
        self.symbols.get(&key).map(String::as_str)
    }
}
