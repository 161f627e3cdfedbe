//! One-field-at-a-time negative mutation of field maps
//!
//! Every map produced here is invalid in exactly one field: the mutated field
//! takes each of its negative candidates in turn while every other field keeps
//! its positively derived pattern. Which candidates a field has is decided by
//! the template's [`NegativePatternsTemplate::negative_patterns_for_key`] hook.

use std::cell::Cell;
use std::iter;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use contractfuzz_core::{ReturnValue, map_fold};

use crate::combinations::{Producer, producer, product};
use crate::pattern::{NegativeStream, Pattern, field_new_based_on, resolved_hop, without_optionality};
use crate::resolver::Resolver;
use crate::row::Row;

/// Negative field maps, each tagged with the mutated field's name.
pub type NegativeMaps<'a> = Box<dyn Iterator<Item = ReturnValue<IndexMap<String, Pattern>>> + 'a>;

pub trait NegativePatternsTemplate {
    /// Negative candidates for one field. A field with none is left out of the enumeration.
    fn negative_patterns_for_key<'a>(
        &self,
        key: &'a str,
        pattern: &'a Pattern,
        row: &'a Row,
        resolver: &Resolver<'a>,
    ) -> NegativeStream<'a>;

    /// Lazily mutate one field at a time. When no field has a single negative
    /// candidate, a lone empty map is produced instead.
    fn negative_based_on<'a>(
        self,
        fields: Vec<(&'a str, &'a Pattern)>,
        row: &'a Row,
        resolver: &Resolver<'a>,
    ) -> NegativeMaps<'a>
    where
        Self: Sized + Copy + 'a,
    {
        let fields: Rc<[(&'a str, &'a Pattern)]> = fields.into();
        let resolver = resolver.clone();
        let mutated = Rc::new(Cell::new(false));
        let any_mutated = Rc::clone(&mutated);

        let maps = (0..fields.len()).flat_map(move |index| {
            let (key, pattern) = fields[index];
            let name = without_optionality(key);
            let candidates = self.negative_patterns_for_key(key, pattern, row, &resolver);

            let fields = Rc::clone(&fields);
            let resolver = resolver.clone();
            let mutated = Rc::clone(&mutated);
            candidates.flat_map(move |candidate| {
                mutated.set(true);
                trace!(field = name, "negating field");
                with_one_field_mutated(index, candidate.breadcrumb(Some(name)), &fields, row, &resolver)
            })
        });

        let nothing_to_negate = iter::once(())
            .filter_map(move |()| (!any_mutated.get()).then(|| ReturnValue::value(IndexMap::new())));

        Box::new(maps.chain(nothing_to_negate))
    }
}

/// Product of the mutated field's candidate with every other field's positive candidates.
fn with_one_field_mutated<'a>(
    mutated: usize,
    candidate: ReturnValue<Pattern>,
    fields: &[(&'a str, &'a Pattern)],
    row: &'a Row,
    resolver: &Resolver<'a>,
) -> NegativeMaps<'a> {
    let producers: Vec<Producer<'a, (&'a str, ReturnValue<Option<Pattern>>)>> = fields
        .iter()
        .enumerate()
        .map(|(index, &(key, pattern))| {
            let name = without_optionality(key);
            if index == mutated {
                let candidate = candidate.clone().map(Some);
                return producer(move || iter::once((name, candidate.clone())));
            }
            let resolver = resolver.clone();
            producer(move || {
                field_new_based_on(key, pattern, row, &resolver)
                    .map(move |positive| (name, ReturnValue::from_result(positive).breadcrumb(Some(name))))
            })
        })
        .collect();

    Box::new(product(producers).map(|combination| {
        map_fold(combination.into_iter().collect::<IndexMap<_, _>>()).map(|fields| {
            fields
                .into_iter()
                .filter_map(|(name, pattern)| pattern.map(|p| (name.to_string(), p)))
                .collect::<IndexMap<String, Pattern>>()
        })
    }))
}

/// Body and object fields: every negative of the field's pattern, plus null when the field is not nullable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllNegativePatterns;

impl NegativePatternsTemplate for AllNegativePatterns {
    fn negative_patterns_for_key<'a>(
        &self,
        _key: &'a str,
        pattern: &'a Pattern,
        row: &'a Row,
        resolver: &Resolver<'a>,
    ) -> NegativeStream<'a> {
        let child = match resolver.cycle_guard(pattern, true) {
            Ok(Some(child)) => child,
            Ok(None) => return Box::new(iter::empty()),
            Err(err) => return Box::new(iter::once(ReturnValue::from_result(Err(err)))),
        };

        let nullable = pattern.is_nullable(&child);
        let saw_null = Rc::new(Cell::new(false));
        let flag = Rc::clone(&saw_null);
        let negatives = pattern.negative_based_on(row, &child).inspect(move |candidate| {
            if matches!(candidate.as_value(), Some(Pattern::Null)) {
                flag.set(true);
            }
        });
        let null = iter::once(())
            .filter_map(move |()| (!nullable && !saw_null.get()).then(|| ReturnValue::value(Pattern::Null)));

        Box::new(negatives.chain(null))
    }
}

/// Query parameters travel as text: a string parameter cannot be negated and null cannot be sent.
/// Array parameters are negated through their items, since each item is sent as its own pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeNonStringlyPatterns;

impl NegativePatternsTemplate for NegativeNonStringlyPatterns {
    fn negative_patterns_for_key<'a>(
        &self,
        _key: &'a str,
        pattern: &'a Pattern,
        row: &'a Row,
        resolver: &Resolver<'a>,
    ) -> NegativeStream<'a> {
        let negatives = match resolved_hop(pattern, resolver) {
            Pattern::String(_) => return Box::new(iter::empty()),
            Pattern::Array(list) => list.item.negative_based_on(row, resolver),
            resolved => resolved.negative_based_on(row, resolver),
        };
        Box::new(negatives.filter(|candidate| !matches!(candidate.as_value(), Some(Pattern::Null))))
    }
}
