// Prefix coding — per-message Huffman tables over characters
//
// Tables are built fresh for every encode call and travel with the message.
// Ties between equal frequencies break on insertion sequence (leaves in
// first-appearance order, merged nodes after them), so the same input always
// yields the same tree.

use super::CodecError;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Symbol → bit-string mapping satisfying the prefix property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeTable(BTreeMap<char, String>);

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: char) -> Option<&str> {
        self.0.get(&symbol).map(String::as_str)
    }

    pub fn insert(&mut self, symbol: char, code: impl Into<String>) {
        self.0.insert(symbol, code.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
        self.0.iter().map(|(c, code)| (*c, code.as_str()))
    }

    /// Invert to code → symbol, rejecting tables that cannot decode
    /// unambiguously.
    fn inverted(&self) -> Result<HashMap<&str, char>, CodecError> {
        let mut reverse = HashMap::with_capacity(self.0.len());
        for (symbol, code) in &self.0 {
            if code.is_empty() || !code.bytes().all(|b| b == b'0' || b == b'1') {
                return Err(CodecError::InvalidTable(format!(
                    "code for {:?} is not a bit-string: {:?}",
                    symbol, code
                )));
            }
            if reverse.insert(code.as_str(), *symbol).is_some() {
                return Err(CodecError::InvalidTable(format!("duplicate code {}", code)));
            }
        }
        Ok(reverse)
    }
}

impl FromIterator<(char, String)> for CodeTable {
    fn from_iter<I: IntoIterator<Item = (char, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Arena node of the prefix tree
enum Node {
    Leaf(char),
    Branch { left: usize, right: usize },
}

/// Compress `text` into a bit-string of '0'/'1' characters and its table.
///
/// Empty input produces an empty bit-string and an empty table. A single
/// distinct symbol gets the one-bit code "0".
pub fn encode(text: &str) -> (String, CodeTable) {
    if text.is_empty() {
        return (String::new(), CodeTable::new());
    }

    // Frequencies in first-appearance order
    let mut order: Vec<char> = Vec::new();
    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in text.chars() {
        let count = freq.entry(c).or_insert(0);
        if *count == 0 {
            order.push(c);
        }
        *count += 1;
    }

    let table = if order.len() == 1 {
        std::iter::once((order[0], "0".to_string())).collect()
    } else {
        build_table(&order, &freq)
    };

    let mut bits = String::new();
    for c in text.chars() {
        if let Some(code) = table.get(c) {
            bits.push_str(code);
        }
    }

    (bits, table)
}

fn build_table(order: &[char], freq: &HashMap<char, usize>) -> CodeTable {
    let mut nodes: Vec<Node> = Vec::with_capacity(order.len() * 2);
    // Min-heap on (frequency, insertion sequence)
    let mut heap: BinaryHeap<Reverse<(usize, usize, usize)>> = BinaryHeap::new();
    let mut seq = 0usize;

    for &c in order {
        nodes.push(Node::Leaf(c));
        heap.push(Reverse((freq[&c], seq, nodes.len() - 1)));
        seq += 1;
    }

    while heap.len() > 1 {
        let (Some(Reverse((lf, _, left))), Some(Reverse((rf, _, right)))) = (heap.pop(), heap.pop())
        else {
            break;
        };
        nodes.push(Node::Branch { left, right });
        heap.push(Reverse((lf + rf, seq, nodes.len() - 1)));
        seq += 1;
    }

    let mut table = CodeTable::new();
    let Some(Reverse((_, _, root))) = heap.pop() else {
        return table;
    };

    let mut stack = vec![(root, String::new())];
    while let Some((index, prefix)) = stack.pop() {
        match &nodes[index] {
            Node::Leaf(c) => table.insert(*c, prefix),
            Node::Branch { left, right } => {
                stack.push((*right, format!("{}1", prefix)));
                stack.push((*left, format!("{}0", prefix)));
            }
        }
    }

    table
}

/// Expand a bit-string back into text using `table`.
///
/// Leftover bits that never complete a code are an error, not a silent
/// truncation.
pub fn decode(bits: &str, table: &CodeTable) -> Result<String, CodecError> {
    let reverse = table.inverted()?;

    let mut decoded = String::new();
    let mut start = 0usize;
    for (i, b) in bits.bytes().enumerate() {
        if b != b'0' && b != b'1' {
            return Err(CodecError::MalformedBits { position: i });
        }
        if let Some(symbol) = reverse.get(&bits[start..=i]) {
            decoded.push(*symbol);
            start = i + 1;
        }
    }

    if start < bits.len() {
        return Err(CodecError::TrailingBits(bits.len() - start));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_prefix_free(table: &CodeTable) -> bool {
        let codes: Vec<&str> = table.iter().map(|(_, code)| code).collect();
        codes.iter().enumerate().all(|(i, a)| {
            codes
                .iter()
                .enumerate()
                .all(|(j, b)| i == j || !b.starts_with(a))
        })
    }

    #[test]
    fn test_single_symbol_gets_zero_code() {
        let (bits, table) = encode("aaa");
        assert_eq!(bits, "000");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get('a'), Some("0"));
        assert_eq!(decode("000", &table).unwrap(), "aaa");
    }

    #[test]
    fn test_empty_input() {
        let (bits, table) = encode("");
        assert!(bits.is_empty());
        assert!(table.is_empty());
        assert_eq!(decode("", &CodeTable::new()).unwrap(), "");
    }

    #[test]
    fn test_frequent_symbol_gets_shorter_code() {
        let (_, table) = encode("aaaaabbc");
        let a = table.get('a').unwrap();
        let c = table.get('c').unwrap();
        assert!(a.len() < c.len());
        assert!(is_prefix_free(&table));
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        // b and c both appear once; b was seen first so it is popped first
        // and lands on the left branch.
        let (bits, table) = encode("bc");
        assert_eq!(table.get('b'), Some("0"));
        assert_eq!(table.get('c'), Some("1"));
        assert_eq!(bits, "01");
        assert_eq!(encode("bc"), encode("bc"));
    }

    #[test]
    fn test_multibyte_symbols() {
        let text = "上海到成都，上海到北京";
        let (bits, table) = encode(text);
        assert_eq!(decode(&bits, &table).unwrap(), text);
    }

    #[test]
    fn test_trailing_bits_rejected() {
        // a:2 b:2 c:1 → b="0", c="10", a="11"
        let (bits, table) = encode("aabbc");
        assert_eq!(table.get('b'), Some("0"));
        assert_eq!(table.get('c'), Some("10"));
        assert_eq!(table.get('a'), Some("11"));
        assert_eq!(decode(&bits, &table).unwrap(), "aabbc");

        let truncated = format!("{}1", bits);
        assert!(matches!(
            decode(&truncated, &table),
            Err(CodecError::TrailingBits(1))
        ));
    }

    #[test]
    fn test_dangling_bits_with_empty_table() {
        assert!(matches!(
            decode("0101", &CodeTable::new()),
            Err(CodecError::TrailingBits(4))
        ));
    }

    #[test]
    fn test_non_binary_characters_rejected() {
        let (_, table) = encode("ab");
        assert!(matches!(
            decode("01x", &table),
            Err(CodecError::MalformedBits { position: 2 })
        ));
    }

    #[test]
    fn test_ambiguous_table_rejected() {
        let table: CodeTable = [('a', "0".to_string()), ('b', "0".to_string())]
            .into_iter()
            .collect();
        assert!(matches!(decode("0", &table), Err(CodecError::InvalidTable(_))));

        let table: CodeTable = [('a', "".to_string())].into_iter().collect();
        assert!(matches!(decode("", &table), Err(CodecError::InvalidTable(_))));
    }

    #[test]
    fn test_table_json_shape() {
        let (_, table) = encode("aab");
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["a"], "1");
        assert_eq!(json["b"], "0");
        let back: CodeTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(text in "\\PC{0,200}") {
            let (bits, table) = encode(&text);
            prop_assert!(is_prefix_free(&table));
            prop_assert_eq!(decode(&bits, &table).unwrap(), text);
        }

        #[test]
        fn prop_repeated_single_char(c in any::<char>(), n in 1usize..64) {
            let text: String = std::iter::repeat(c).take(n).collect();
            let (bits, table) = encode(&text);
            prop_assert_eq!(bits.len(), n);
            prop_assert_eq!(decode(&bits, &table).unwrap(), text);
        }
    }
}
