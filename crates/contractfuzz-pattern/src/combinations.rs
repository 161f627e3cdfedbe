//! Lazy cartesian products and optional-key combinations

use std::iter;
use std::rc::Rc;

use crate::pattern::{is_optional, without_optionality};
use crate::row::Row;

/// Re-invocable source of candidates for one position of a product.
pub(crate) type Producer<'a, T> = Rc<dyn Fn() -> Box<dyn Iterator<Item = T> + 'a> + 'a>;

pub(crate) fn producer<'a, T, I, F>(f: F) -> Producer<'a, T>
where
    F: Fn() -> I + 'a,
    I: Iterator<Item = T> + 'a,
{
    Rc::new(move || Box::new(f()) as Box<dyn Iterator<Item = T> + 'a>)
}

/// Every combination taking one item from each producer, first producer outermost.
///
/// Inner producers are re-invoked once per outer item, so nothing is buffered.
pub(crate) fn product<'a, T: Clone + 'a>(producers: Vec<Producer<'a, T>>) -> Box<dyn Iterator<Item = Vec<T>> + 'a> {
    product_from(Rc::from(producers), 0)
}

fn product_from<'a, T: Clone + 'a>(producers: Rc<[Producer<'a, T>]>, index: usize) -> Box<dyn Iterator<Item = Vec<T>> + 'a> {
    let Some(first) = producers.get(index) else {
        return Box::new(iter::once(Vec::new()));
    };
    let head = first();
    Box::new(head.flat_map(move |item| {
        product_from(Rc::clone(&producers), index + 1).map(move |mut rest| {
            rest.insert(0, item.clone());
            rest
        })
    }))
}

/// Key sets to derive from.
///
/// With an empty row: all keys, then required keys only. With a row: keys the
/// row names and required keys always, every other optional key both omitted and present.
pub(crate) fn key_combinations<'k>(keys: &[&'k str], row: &Row) -> Box<dyn Iterator<Item = Vec<&'k str>> + 'k> {
    if row.is_empty() {
        let all = keys.to_vec();
        let required: Vec<&str> = keys.iter().copied().filter(|k| !is_optional(k)).collect();
        return if required.len() == all.len() {
            Box::new(iter::once(all))
        } else {
            Box::new([all, required].into_iter())
        };
    }

    let producers: Vec<Producer<'k, Option<&'k str>>> = keys
        .iter()
        .map(|&key| {
            let choices = if is_optional(key) && !row.contains_field(without_optionality(key)) {
                vec![None, Some(key)]
            } else {
                vec![Some(key)]
            };
            producer(move || choices.clone().into_iter())
        })
        .collect();

    Box::new(product(producers).map(|choice| choice.into_iter().flatten().collect()))
}
