use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<Index>,
    next: Option<Index>,
}

/// Recency order for cache entries: head is the most recently used.
///
/// Nodes live in an arena and link to each other by index. A removed node's
/// index goes stale rather than dangling, so a late `move_to_front` with an
/// old index is a harmless no-op.
#[derive(Debug)]
pub(super) struct RecencyList<T> {
    nodes: Arena<Node<T>>,
    head: Option<Index>,
    tail: Option<Index>,
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        RecencyList {
            nodes: Arena::new(),
            head: None,
            tail: None,
        }
    }
}

impl<T> RecencyList<T> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn push_front(&mut self, value: T) -> Index {
        let index = self.nodes.insert(Node {
            value,
            prev: None,
            next: None,
        });
        self.link_front(index);
        index
    }

    /// Returns `false` if `index` no longer refers to a node.
    pub fn move_to_front(&mut self, index: Index) -> bool {
        if !self.nodes.contains(index) {
            return false;
        }
        if self.head != Some(index) {
            self.unlink(index);
            self.link_front(index);
        }
        true
    }

    pub fn remove(&mut self, index: Index) -> Option<T> {
        if !self.nodes.contains(index) {
            return None;
        }
        self.unlink(index);
        self.nodes.remove(index).map(|node| node.value)
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let tail = self.tail?;
        self.remove(tail)
    }

    /// Values from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let node = &self.nodes[current?];
            current = node.next;
            Some(&node.value)
        })
    }

    /// Empties the list, returning values from most to least recently used.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());
        while let Some(head) = self.head {
            match self.remove(head) {
                Some(value) => values.push(value),
                None => break,
            }
        }
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        values
    }

    fn unlink(&mut self, index: Index) {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[index];
        node.prev = None;
        node.next = None;
    }

    fn link_front(&mut self, index: Index) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[index];
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old_head) = old_head {
            self.nodes[old_head].prev = Some(index);
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &RecencyList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn push_front_orders_by_recency() {
        let mut list = RecencyList::default();
        list.push_front(1);
        list.push_front(2);
        list.push_front(3);
        assert_eq!(vec![3, 2, 1], values(&list));
        assert_eq!(3, list.len());
    }

    #[test]
    fn move_to_front_promotes() {
        let mut list = RecencyList::default();
        let one = list.push_front(1);
        list.push_front(2);
        let three = list.push_front(3);

        assert!(list.move_to_front(one));
        assert_eq!(vec![1, 3, 2], values(&list));
        assert!(list.move_to_front(one));
        assert_eq!(vec![1, 3, 2], values(&list));

        list.remove(three);
        assert!(!list.move_to_front(three));
        assert_eq!(vec![1, 2], values(&list));
    }

    #[test]
    fn pop_back_takes_least_recent() {
        let mut list = RecencyList::default();
        list.push_front(1);
        list.push_front(2);
        assert_eq!(Some(1), list.pop_back());
        assert_eq!(Some(2), list.pop_back());
        assert_eq!(None, list.pop_back());
        assert_eq!(0, list.len());
    }

    #[test]
    fn stale_index_survives_slot_reuse() {
        let mut list = RecencyList::default();
        let one = list.push_front(1);
        list.remove(one);
        list.push_front(2);
        assert_eq!(None, list.remove(one));
        assert_eq!(vec![2], values(&list));
    }

    #[test]
    fn drain_empties_in_recency_order() {
        let mut list = RecencyList::default();
        list.push_front(1);
        list.push_front(2);
        assert_eq!(vec![2, 1], list.drain());
        assert_eq!(0, list.len());
        assert_eq!(None, list.pop_back());
    }
}
