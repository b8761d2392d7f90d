// ===============================
// src/order_list.rs
// ===============================
//
// Sentinel-headed singly-linked list stored in an arena (Vec + next index).
// Slot 0 is the sentinel. Freed slots are reused by later pushes.
//
use crate::order::{self, Order, OrderError};

const HEAD: usize = 0;

#[derive(Debug, Clone)]
struct Node {
    order: Option<Order>,
    next: Option<usize>,
}

/// Resting orders of one side group, kept sorted by priority.
#[derive(Debug, Clone)]
pub struct OrderList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    len: usize,
}

impl Default for OrderList {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderList {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node { order: None, next: None }],
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts after every order that ranks before or equal to `order`,
    /// so equal-priority orders keep arrival order. O(n).
    pub fn push(&mut self, order: Order) -> Result<(), OrderError> {
        let mut prev = HEAD;
        while let Some(next) = self.nodes[prev].next {
            if let Some(existing) = self.nodes[next].order.as_ref() {
                if order.is_less_than(existing)? {
                    break;
                }
            }
            prev = next;
        }
        let node = Node { order: Some(order), next: self.nodes[prev].next };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.nodes[prev].next = Some(idx);
        self.len += 1;
        Ok(())
    }

    /// Removes the highest-priority order. `None` once empty.
    pub fn pop(&mut self) -> Option<Order> {
        let idx = self.nodes[HEAD].next?;
        self.nodes[HEAD].next = self.nodes[idx].next.take();
        self.free.push(idx);
        self.len -= 1;
        self.nodes[idx].order.take()
    }

    pub fn front(&self) -> Option<&Order> {
        let idx = self.nodes[HEAD].next?;
        self.nodes[idx].order.as_ref()
    }

    /// Head order for in-place fill updates. Price and id must not be
    /// touched through this, otherwise the ordering breaks.
    pub fn front_mut(&mut self) -> Option<&mut Order> {
        let idx = self.nodes[HEAD].next?;
        self.nodes[idx].order.as_mut()
    }

    /// Whether the head order may trade at `price`. Empty list: false.
    pub fn can_match(&self, price: f64) -> Result<bool, OrderError> {
        order::can_match(self.front(), price)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter { list: self, cursor: self.nodes[HEAD].next }
    }
}

pub struct Iter<'a> {
    list: &'a OrderList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Order;

    fn next(&mut self) -> Option<&'a Order> {
        let idx = self.cursor?;
        let node = &self.list.nodes[idx];
        self.cursor = node.next;
        node.order.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    // lb1 @100000, mb1, mb2 (id+1), lb2 @90000
    fn sample() -> (OrderList, Vec<Order>) {
        let lb1 = Order::limit("BTC", "USDT", Side::Buy, 100.0, 100000.0);
        let mb1 = Order::market("BTC", "USDT", Side::Buy, 100000.0);
        let mb2 = Order { id: mb1.id + 1, ..mb1.clone() };
        let lb2 = Order { asset_price: lb1.asset_price - 10000.0, ..lb1.clone() };

        let mut ol = OrderList::new();
        ol.push(lb1.clone()).unwrap();
        assert_eq!(ol.front(), Some(&lb1));
        ol.push(mb1.clone()).unwrap();
        assert_eq!(ol.front(), Some(&mb1));
        ol.push(mb2.clone()).unwrap();
        ol.push(lb2.clone()).unwrap();
        (ol, vec![mb1, mb2, lb1, lb2])
    }

    #[test]
    fn push_keeps_priority_order() {
        let (ol, expected) = sample();
        let got: Vec<&Order> = ol.iter().collect();
        assert_eq!(got, expected.iter().collect::<Vec<_>>());
        assert_eq!(ol.len(), 4);
    }

    #[test]
    fn pop_follows_priority_then_stays_empty() {
        let (mut ol, expected) = sample();
        for want in expected {
            assert_eq!(ol.pop(), Some(want));
        }
        assert_eq!(ol.pop(), None);
        assert_eq!(ol.pop(), None);
        assert!(ol.is_empty());
    }

    #[test]
    fn equal_priority_keeps_arrival_order() {
        let a = Order::limit("BTC", "USDT", Side::Sell, 1.0, 100.0);
        let b = Order::limit("BTC", "USDT", Side::Sell, 2.0, 100.0);
        let mut ol = OrderList::new();
        ol.push(a.clone()).unwrap();
        ol.push(b.clone()).unwrap();
        assert_eq!(ol.pop(), Some(a));
        assert_eq!(ol.pop(), Some(b));
    }

    #[test]
    fn slots_are_reused_after_pop() {
        let (mut ol, _) = sample();
        ol.pop();
        ol.pop();
        let mb = Order::market("BTC", "USDT", Side::Buy, 1.0);
        ol.push(mb.clone()).unwrap();
        assert_eq!(ol.front(), Some(&mb));
        assert_eq!(ol.len(), 3);
        assert_eq!(ol.nodes.len(), 5);
    }

    #[test]
    fn push_across_sides_is_rejected() {
        let mut ol = OrderList::new();
        ol.push(Order::market("BTC", "USDT", Side::Buy, 1.0)).unwrap();
        let res = ol.push(Order::market("BTC", "USDT", Side::Sell, 1.0));
        assert!(matches!(res, Err(OrderError::SideMismatch { .. })));
        assert_eq!(ol.len(), 1);
    }

    #[test]
    fn can_match_follows_head() {
        let mut ol = OrderList::new();
        assert_eq!(ol.can_match(0.0), Ok(false));

        ol.push(Order::limit("BTC", "USDT", Side::Buy, 100.0, 100000.0)).unwrap();
        assert_eq!(ol.can_match(100000.0), Ok(true));
        assert_eq!(ol.can_match(99000.0), Ok(true));
        assert_eq!(ol.can_match(101000.0), Ok(false));

        ol.push(Order::market("BTC", "USDT", Side::Buy, 100000.0)).unwrap();
        assert_eq!(ol.can_match(1e12), Ok(true));

        let mut asks = OrderList::new();
        asks.push(Order::limit("BTC", "USDT", Side::Sell, 100.0, 100000.0)).unwrap();
        assert_eq!(asks.can_match(100000.0), Ok(true));
        assert_eq!(asks.can_match(101000.0), Ok(true));
        assert_eq!(asks.can_match(99000.0), Ok(false));
    }
}
