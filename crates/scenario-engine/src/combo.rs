//! Cartesian product over per-constraint choice lists
//!
//! [`Combos`] is a lazy odometer: the last list spins fastest. Each item
//! picks exactly one element from every list.

/// Lazy cartesian product of `lists`
#[derive(Debug, Clone)]
pub struct Combos<'a, T> {
    lists: &'a [Vec<T>],
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a, T> Combos<'a, T> {
    /// Enumerate every combination of one element per list
    ///
    /// No lists yield a single empty combo; any empty list yields nothing.
    #[must_use]
    pub fn new(lists: &'a [Vec<T>]) -> Self {
        Self {
            lists,
            indices: vec![0; lists.len()],
            exhausted: lists.iter().any(Vec::is_empty),
        }
    }

    /// Total number of combos
    #[must_use]
    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).product()
    }

    fn advance(&mut self) {
        for position in (0..self.indices.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.lists[position].len() {
                return;
            }
            self.indices[position] = 0;
        }
        self.exhausted = true;
    }
}

impl<'a, T> Iterator for Combos<'a, T> {
    type Item = Vec<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let combo = self
            .indices
            .iter()
            .zip(self.lists)
            .map(|(&i, list)| &list[i])
            .collect();
        self.advance();
        Some(combo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn two_by_three_yields_six_distinct_pairs() {
        let lists = vec![vec!['a', 'b'], vec!['x', 'y', 'z']];
        let combos: Vec<Vec<&char>> = Combos::new(&lists).collect();

        assert_eq!(combos.len(), 6);
        assert!(combos.iter().all(|c| c.len() == 2));

        let unique: HashSet<(char, char)> = combos.iter().map(|c| (*c[0], *c[1])).collect();
        assert_eq!(unique.len(), 6);
        for a in ['a', 'b'] {
            for x in ['x', 'y', 'z'] {
                assert!(unique.contains(&(a, x)));
            }
        }
    }

    #[test]
    fn last_list_spins_fastest() {
        let lists = vec![vec![1, 2], vec![10, 20]];
        let combos: Vec<Vec<i32>> = Combos::new(&lists)
            .map(|c| c.into_iter().copied().collect())
            .collect();
        assert_eq!(combos, vec![vec![1, 10], vec![1, 20], vec![2, 10], vec![2, 20]]);
    }

    #[test]
    fn no_lists_yield_one_empty_combo() {
        let lists: Vec<Vec<u8>> = Vec::new();
        let combos: Vec<_> = Combos::new(&lists).collect();
        assert_eq!(combos, vec![Vec::<&u8>::new()]);
    }

    #[test]
    fn empty_list_yields_nothing() {
        let lists = vec![vec![1], Vec::new()];
        assert_eq!(Combos::new(&lists).count(), 0);
    }

    proptest! {
        #[test]
        fn count_matches_product(sizes in proptest::collection::vec(1usize..5, 0..5)) {
            let lists: Vec<Vec<usize>> = sizes.iter().map(|&n| (0..n).collect()).collect();
            let combos = Combos::new(&lists);
            let expected = combos.total();
            let all: Vec<Vec<usize>> = combos.map(|c| c.into_iter().copied().collect()).collect();

            prop_assert_eq!(all.len(), expected);
            let unique: HashSet<Vec<usize>> = all.iter().cloned().collect();
            prop_assert_eq!(unique.len(), expected);
            prop_assert!(all.iter().all(|c| c.len() == sizes.len()));
        }
    }
}
