use rand::Rng;
use std::fmt;

const WORD_BITS: u32 = 64;

/// Fixed-size bitmap of partition ids `0..partition_count`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionSet {
    partition_count: u32,
    words: Vec<u64>,
}

impl PartitionSet {
    /// Create an empty set for a service with `partition_count` partitions
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count,
            words: vec![0; Self::word_count(partition_count)],
        }
    }

    /// Create a set holding every partition
    pub fn full(partition_count: u32) -> Self {
        let mut set = Self::new(partition_count);
        set.fill();
        set
    }

    pub fn from_partitions(partition_count: u32, partitions: impl IntoIterator<Item = u32>) -> Self {
        let mut set = Self::new(partition_count);
        for partition in partitions {
            set.add(partition);
        }
        set
    }

    /// Rebuild a set from raw bitmap words; `None` if a bit beyond the count is set
    pub fn from_words(partition_count: u32, words: Vec<u64>) -> Option<Self> {
        if words.len() != Self::word_count(partition_count) {
            return None;
        }
        let set = Self {
            partition_count,
            words,
        };
        if set.words.last().copied().unwrap_or(0) & !set.last_word_mask() != 0 {
            return None;
        }
        Some(set)
    }

    pub(crate) fn word_count(partition_count: u32) -> usize {
        partition_count.div_ceil(WORD_BITS) as usize
    }

    fn last_word_mask(&self) -> u64 {
        match self.partition_count % WORD_BITS {
            0 => u64::MAX,
            bits => (1u64 << bits) - 1,
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Add a partition, returning `true` if it was not already present
    pub fn add(&mut self, partition: u32) -> bool {
        if partition >= self.partition_count {
            return false;
        }
        let (word, bit) = Self::locate(partition);
        let added = self.words[word] & bit == 0;
        self.words[word] |= bit;
        added
    }

    /// Remove a partition, returning `true` if it was present
    pub fn remove(&mut self, partition: u32) -> bool {
        if partition >= self.partition_count {
            return false;
        }
        let (word, bit) = Self::locate(partition);
        let removed = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        removed
    }

    pub fn contains(&self, partition: u32) -> bool {
        if partition >= self.partition_count {
            return false;
        }
        let (word, bit) = Self::locate(partition);
        self.words[word] & bit != 0
    }

    pub fn cardinality(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn is_full(&self) -> bool {
        self.cardinality() == self.partition_count
    }

    pub fn fill(&mut self) {
        for word in self.words.iter_mut() {
            *word = u64::MAX;
        }
        let mask = self.last_word_mask();
        if let Some(last) = self.words.last_mut() {
            *last &= mask;
        }
    }

    pub fn clear(&mut self) {
        for word in self.words.iter_mut() {
            *word = 0;
        }
    }

    /// Union `other` into this set
    pub fn add_all(&mut self, other: &PartitionSet) {
        for (word, other) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= *other;
        }
    }

    /// Remove every partition of `other` from this set
    pub fn remove_all(&mut self, other: &PartitionSet) {
        for (word, other) in self.words.iter_mut().zip(other.words.iter()) {
            *word &= !*other;
        }
    }

    /// Keep only the partitions also present in `other`
    pub fn retain_all(&mut self, other: &PartitionSet) {
        for (word, other) in self.words.iter_mut().zip(other.words.iter()) {
            *word &= *other;
        }
    }

    pub fn intersects(&self, other: &PartitionSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// First partition at or after `from`, without wrapping
    pub fn next(&self, from: u32) -> Option<u32> {
        if from >= self.partition_count {
            return None;
        }
        let (mut word_index, _) = Self::locate(from);
        let mut word = self.words[word_index] & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                let partition = word_index as u32 * WORD_BITS + word.trailing_zeros();
                return (partition < self.partition_count).then_some(partition);
            }
            word_index += 1;
            if word_index >= self.words.len() {
                return None;
            }
            word = self.words[word_index];
        }
    }

    /// First partition at or after `from`, wrapping around the ring
    pub fn next_wrapping(&self, from: u32) -> Option<u32> {
        let from = if from >= self.partition_count { 0 } else { from };
        self.next(from).or_else(|| self.next(0))
    }

    /// A uniformly chosen position on the ring, snapped forward to a member of the set
    pub fn random_partition<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u32> {
        if self.partition_count == 0 || self.is_empty() {
            return None;
        }
        let start = rng.gen_range(0..self.partition_count);
        self.next_wrapping(start)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let mut cursor = 0u32;
        std::iter::from_fn(move || {
            let next = self.next(cursor)?;
            cursor = next + 1;
            Some(next)
        })
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }

    fn locate(partition: u32) -> (usize, u64) {
        (
            (partition / WORD_BITS) as usize,
            1u64 << (partition % WORD_BITS),
        )
    }
}

impl fmt::Display for PartitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionSet{{")?;
        let mut first = true;
        let mut iter = self.iter().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end = iter.next().unwrap_or(end);
            }
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}..{end}")?;
            }
        }
        write!(f, "}}")
    }
}
