use shared::dto::Answer;

/// Partitions one question's answers into fixed-size batches, skipping
/// answers without text or with `min_words` words or fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSplitter {
    batch_size: usize,
    min_words: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch<'a> {
    pub index: usize,
    pub answers: Vec<&'a Answer>,
}

impl BatchSplitter {
    pub fn new(batch_size: usize, min_words: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            min_words,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn min_words(&self) -> usize {
        self.min_words
    }

    pub fn is_eligible(&self, answer: &Answer) -> bool {
        answer.text.is_some() && answer.word_count() > self.min_words
    }

    /// Lazy batches of `question_id`'s eligible answers, in input order.
    /// The iterator is `Clone`, so a sequence can be replayed.
    pub fn split<'a>(&self, answers: &'a [Answer], question_id: i32) -> Batches<'a> {
        Batches {
            splitter: *self,
            answers,
            question_id,
            cursor: 0,
            next_index: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Batches<'a> {
    splitter: BatchSplitter,
    answers: &'a [Answer],
    question_id: i32,
    cursor: usize,
    next_index: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Batch<'a>> {
        let mut batch = Vec::with_capacity(self.splitter.batch_size.min(self.answers.len()));
        while self.cursor < self.answers.len() && batch.len() < self.splitter.batch_size {
            let answer = &self.answers[self.cursor];
            self.cursor += 1;
            if answer.question_id == self.question_id && self.splitter.is_eligible(answer) {
                batch.push(answer);
            }
        }
        if batch.is_empty() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(Batch {
            index,
            answers: batch,
        })
    }
}
