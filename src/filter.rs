//! Calendar year / month selection applied before segmentation and reporting

use crate::error::{Result, RfmError};
use crate::model::OrderRecord;
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Selected years and months; an empty set selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodFilter {
    pub years: BTreeSet<i32>,
    pub months: BTreeSet<u32>,
}

impl PeriodFilter {
    /// Parse comma-separated selectors, e.g. `"2017,2018"` and `"jan,February,3"`
    pub fn parse(years: Option<&str>, months: Option<&str>) -> Result<Self> {
        let years = match years {
            Some(list) => split_list(list)
                .map(|part| {
                    part.parse::<i32>()
                        .map_err(|_| RfmError::InvalidFilter(format!("invalid year '{}'", part)))
                })
                .collect::<Result<BTreeSet<_>>>()?,
            None => BTreeSet::new(),
        };

        let months = match months {
            Some(list) => split_list(list)
                .map(|part| {
                    parse_month(part)
                        .ok_or_else(|| RfmError::InvalidFilter(format!("invalid month '{}'", part)))
                })
                .collect::<Result<BTreeSet<_>>>()?,
            None => BTreeSet::new(),
        };

        Ok(Self { years, months })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.years.is_empty() && self.months.is_empty()
    }

    pub fn matches(&self, timestamp: &NaiveDateTime) -> bool {
        (self.years.is_empty() || self.years.contains(&timestamp.year()))
            && (self.months.is_empty() || self.months.contains(&timestamp.month()))
    }

    pub fn apply(&self, orders: &[OrderRecord]) -> Vec<OrderRecord> {
        orders
            .iter()
            .filter(|order| self.matches(&order.purchase_timestamp))
            .cloned()
            .collect()
    }
}

/// Distinct purchase years, ascending
pub fn available_years(orders: &[OrderRecord]) -> Vec<i32> {
    orders
        .iter()
        .map(|order| order.purchase_timestamp.year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct purchase months in calendar order
pub fn available_months(orders: &[OrderRecord]) -> Vec<&'static str> {
    orders
        .iter()
        .map(|order| order.purchase_timestamp.month())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(month_name)
        .collect()
}

/// English name for a month number (1-12)
pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month as usize).saturating_sub(1) % 12]
}

fn parse_month(value: &str) -> Option<u32> {
    if let Ok(number) = value.parse::<u32>() {
        return (1..=12).contains(&number).then_some(number);
    }

    let lower = value.to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|name| {
            let name = name.to_lowercase();
            name == lower || (lower.len() == 3 && name.starts_with(&lower))
        })
        .map(|index| index as u32 + 1)
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn order(customer: &str, y: i32, m: u32, d: u32) -> OrderRecord {
        let ts = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        OrderRecord::new(format!("{}-{}{}", customer, y, m), customer, 10.0, ts)
    }

    #[test]
    fn test_parse_filter() {
        let filter = PeriodFilter::parse(Some("2017, 2018"), Some("jan,February,12")).unwrap();
        assert_eq!(filter.years, BTreeSet::from([2017, 2018]));
        assert_eq!(filter.months, BTreeSet::from([1, 2, 12]));

        let all = PeriodFilter::parse(None, None).unwrap();
        assert!(all.is_unrestricted());

        assert!(PeriodFilter::parse(Some("twenty"), None).is_err());
        assert!(PeriodFilter::parse(None, Some("13")).is_err());
        assert!(PeriodFilter::parse(None, Some("ju")).is_err());
    }

    #[test]
    fn test_apply_filter() {
        let orders = vec![
            order("a", 2017, 1, 5),
            order("b", 2017, 6, 5),
            order("c", 2018, 1, 5),
        ];

        let filter = PeriodFilter::parse(Some("2017"), Some("january")).unwrap();
        let kept = filter.apply(&orders);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].customer_id, "a");

        let filter = PeriodFilter::parse(None, Some("Jan")).unwrap();
        assert_eq!(filter.apply(&orders).len(), 2);
    }

    #[test]
    fn test_available_periods() {
        let orders = vec![
            order("a", 2018, 11, 5),
            order("b", 2016, 2, 5),
            order("c", 2018, 2, 5),
        ];

        assert_eq!(available_years(&orders), vec![2016, 2018]);
        assert_eq!(available_months(&orders), vec!["February", "November"]);
    }
}
