//! Capture bindings produced by the matcher.

use rustc_hash::FxHashMap;

use crate::token::Token;

/// The value bound to one capture name.
///
/// A capture declared inside `d` repeaters is `d` levels of `Seq` around
/// `Tree`s. A `null` capture binds an empty tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Tree(Vec<Token>),
    /// One entry per repetition
    Seq(Vec<Binding>),
}

impl Binding {
    /// The binding a name gets where it was never reached: an empty tree at
    /// depth 0, otherwise an empty sequence.
    pub fn empty(depth: usize) -> Self {
        if depth == 0 {
            Self::Tree(Vec::new())
        } else {
            Self::Seq(Vec::new())
        }
    }

    /// Follows `path` through nested sequences.
    ///
    /// A tree reached before the path is exhausted is returned as is, so a
    /// capture declared outside a repeater can be used inside it. `None` if
    /// an index is out of range.
    pub fn at_path(&self, path: &[usize]) -> Option<&Binding> {
        let mut binding = self;
        for &index in path {
            match binding {
                Self::Tree(_) => break,
                Self::Seq(items) => binding = items.get(index)?,
            }
        }
        Some(binding)
    }

    /// Levels of sequence nesting; an empty sequence counts as one level.
    pub fn depth(&self) -> usize {
        match self {
            Self::Tree(_) => 0,
            Self::Seq(items) => 1 + items.first().map_or(0, Binding::depth),
        }
    }

    /// Number of repetitions if this binding is a sequence.
    pub fn repetitions(&self) -> Option<usize> {
        match self {
            Self::Seq(items) => Some(items.len()),
            Self::Tree(_) => None,
        }
    }
}

/// Capture name to binding.
pub type Bindings = FxHashMap<String, Binding>;

/// Every tree reached through nested sequences, in order.
pub(crate) fn leaves<'b>(binding: &'b Binding, out: &mut Vec<&'b [Token]>) {
    match binding {
        Binding::Tree(tokens) => out.push(tokens),
        Binding::Seq(items) => items.iter().for_each(|item| leaves(item, out)),
    }
}

/// All tokens of a binding, concatenated across repetitions.
pub(crate) fn flatten(binding: Option<&Binding>) -> Vec<Token> {
    let mut parts = Vec::new();
    if let Some(binding) = binding {
        leaves(binding, &mut parts);
    }
    parts.concat()
}

/// The first token bound to a depth-0 capture.
pub(crate) fn single(bindings: &Bindings, name: &str) -> Option<Token> {
    match bindings.get(name)? {
        Binding::Tree(tokens) => tokens.first().cloned(),
        Binding::Seq(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(text: &str) -> Binding {
        Binding::Tree(vec![Token::name(text)])
    }

    #[test]
    fn test_at_path_descends_sequences() {
        let binding = Binding::Seq(vec![
            Binding::Seq(vec![tree("a"), tree("b")]),
            Binding::Seq(vec![tree("c")]),
        ]);
        assert_eq!(binding.at_path(&[]).and_then(Binding::repetitions), Some(2));
        assert_eq!(binding.at_path(&[0]).and_then(Binding::repetitions), Some(2));
        assert_eq!(binding.at_path(&[1, 0]), Some(&tree("c")));
        assert_eq!(binding.at_path(&[1, 1]), None);
    }

    #[test]
    fn test_at_path_stops_at_tree() {
        let binding = tree("x");
        assert_eq!(binding.at_path(&[3, 1]), Some(&tree("x")));
    }

    #[test]
    fn test_flatten_concatenates_repetitions() {
        let binding = Binding::Seq(vec![
            Binding::Seq(vec![tree("a"), tree("b")]),
            Binding::Seq(vec![]),
            Binding::Seq(vec![tree("c")]),
        ]);
        let names: Vec<_> = flatten(Some(&binding)).into_iter().map(|t| t.text).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(flatten(None).is_empty());
    }

    #[test]
    fn test_empty_shapes() {
        assert_eq!(Binding::empty(0), Binding::Tree(vec![]));
        assert_eq!(Binding::empty(2), Binding::Seq(vec![]));
    }
}
