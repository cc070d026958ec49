use std::collections::HashMap;
use std::hash::Hash;

/// Counts how often each key was contributed to one entity.
///
/// The first value seen for a key is kept. Resolution picks the key
/// with the highest count, and the earliest key on ties.
#[derive(Clone, Debug)]
pub struct Contribution<K, T> {
    entries: Vec<(T, usize)>,
    keys: HashMap<K, usize>,
}

impl<K: Hash + Eq, T> Contribution<K, T> {
    pub fn new(key: K, value: T) -> Self {
        let mut keys = HashMap::new();
        keys.insert(key, 0);
        Self {
            entries: vec![(value, 1)],
            keys,
        }
    }

    pub fn add(&mut self, key: K, value: T) {
        match self.keys.get(&key) {
            Some(&index) => self.entries[index].1 += 1,
            None => {
                self.keys.insert(key, self.entries.len());
                self.entries.push((value, 1));
            }
        }
    }

    pub fn resolve(&self) -> &T {
        let mut best = &self.entries[0];
        for entry in &self.entries[1..] {
            if entry.1 > best.1 {
                best = entry;
            }
        }
        &best.0
    }
}

#[cfg(test)]
mod tests {
    use super::Contribution;

    #[test]
    fn majority_wins() {
        let mut names = Contribution::new("rock", "rock");
        for _ in 0..3 {
            names.add("Rock", "Rock");
        }
        assert_eq!(*names.resolve(), "Rock");
    }

    #[test]
    fn ties_go_to_first_seen() {
        let mut names = Contribution::new("Foo", 1);
        names.add("foo", 2);
        names.add("FOO", 3);
        names.add("foo", 4);
        names.add("Foo", 5);
        assert_eq!(*names.resolve(), 1);
    }

    #[test]
    fn keys_need_not_be_strings() {
        let mut sizes = Contribution::new(Some(2u8), "two");
        sizes.add(None, "none");
        sizes.add(None, "still none");
        assert_eq!(*sizes.resolve(), "none");
    }
}
