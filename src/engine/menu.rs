use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::localized::LocalizedText;
use crate::models::menu::{Availability, Category, Meal, Menu};

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub id: String,
    pub name: LocalizedText,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityAction {
    Show,
    Hide,
    HideUntilTomorrow,
    MarkUnavailable,
    UnavailableUntilTomorrow,
}

/// Meals in display order; meals without an `order` go last, keeping their
/// stored sequence.
pub fn sorted_meals(meals: &[Meal]) -> Vec<Meal> {
    let mut sorted = meals.to_vec();
    sorted.sort_by_key(|meal| meal.order.unwrap_or(i64::MAX));
    sorted
}

/// Adds a category, or merges name and icon onto an existing one.
pub fn upsert_category(menu: &mut Menu, input: CategoryInput) -> Result<Category, AppError> {
    let id = input.id.trim().to_string();
    if id.is_empty() {
        return Err(AppError::BadRequest("category id cannot be empty".to_string()));
    }

    if let Some(existing) = menu.categories.iter_mut().find(|cat| cat.id == id) {
        existing.name = input.name;
        existing.icon = input.icon;
        return Ok(existing.clone());
    }

    let category = Category {
        id: id.clone(),
        name: input.name,
        icon: input.icon,
        hidden: false,
        order: Some(menu.categories.len() as i64),
        extra: Default::default(),
    };
    menu.categories.push(category.clone());
    menu.items.entry(id).or_default();

    Ok(category)
}

pub fn set_category_hidden(menu: &mut Menu, id: &str, hidden: bool) -> Result<Category, AppError> {
    let category = menu
        .categories
        .iter_mut()
        .find(|cat| cat.id == id)
        .ok_or_else(|| category_not_found(id))?;

    category.hidden = hidden;
    Ok(category.clone())
}

/// Removes the category together with its meals.
pub fn delete_category(menu: &mut Menu, id: &str) -> Result<(), AppError> {
    let before = menu.categories.len();
    menu.categories.retain(|cat| cat.id != id);
    if menu.categories.len() == before {
        return Err(category_not_found(id));
    }

    menu.items.remove(id);
    Ok(())
}

pub fn reorder_categories(menu: &mut Menu, ids: &[String]) -> Result<(), AppError> {
    let current: Vec<&str> = menu.categories.iter().map(|cat| cat.id.as_str()).collect();
    ensure_permutation(&current, ids, "categories")?;

    menu.categories
        .sort_by_key(|cat| ids.iter().position(|id| *id == cat.id));
    for (index, category) in menu.categories.iter_mut().enumerate() {
        category.order = Some(index as i64);
    }

    Ok(())
}

/// Appends a validated meal to a category. A missing id becomes `m_<millis>`.
pub fn add_meal(
    menu: &mut Menu,
    category_id: &str,
    mut meal: Meal,
    now: DateTime<Utc>,
) -> Result<Meal, AppError> {
    validate_meal(&meal)?;
    ensure_category(menu, category_id)?;

    if meal.id.trim().is_empty() {
        meal.id = format!("m_{}", now.timestamp_millis());
    }
    let taken: HashSet<&str> = menu
        .items
        .values()
        .flatten()
        .map(|existing| existing.id.as_str())
        .collect();
    if taken.contains(meal.id.as_str()) {
        let base = meal.id.clone();
        let suffix = (2..)
            .find(|n| !taken.contains(format!("{base}_{n}").as_str()))
            .unwrap_or(2);
        meal.id = format!("{base}_{suffix}");
    }

    let meals = menu.items.entry(category_id.to_string()).or_default();
    meal.order = Some(meals.len() as i64);
    meals.push(meal.clone());

    Ok(meal)
}

/// Replaces a meal's content. The id always follows the path and a missing
/// `order` keeps the stored one.
pub fn update_meal(
    menu: &mut Menu,
    category_id: &str,
    meal_id: &str,
    mut meal: Meal,
) -> Result<Meal, AppError> {
    validate_meal(&meal)?;
    let existing = find_meal_mut(menu, category_id, meal_id)?;

    meal.id = existing.id.clone();
    if meal.order.is_none() {
        meal.order = existing.order;
    }
    *existing = meal.clone();

    Ok(meal)
}

pub fn delete_meal(menu: &mut Menu, category_id: &str, meal_id: &str) -> Result<(), AppError> {
    let meals = menu
        .items
        .get_mut(category_id)
        .ok_or_else(|| category_not_found(category_id))?;

    let mut ordered = sorted_meals(meals);
    let before = ordered.len();
    ordered.retain(|meal| meal.id != meal_id);
    if ordered.len() == before {
        return Err(meal_not_found(meal_id));
    }

    renumber(&mut ordered);
    *meals = ordered;
    Ok(())
}

pub fn reorder_meals(menu: &mut Menu, category_id: &str, ids: &[String]) -> Result<(), AppError> {
    let meals = menu
        .items
        .get_mut(category_id)
        .ok_or_else(|| category_not_found(category_id))?;

    let current: Vec<&str> = meals.iter().map(|meal| meal.id.as_str()).collect();
    ensure_permutation(&current, ids, "meals")?;

    meals.sort_by_key(|meal| ids.iter().position(|id| *id == meal.id));
    renumber(meals);
    Ok(())
}

/// Moves a meal into another category at `position` (end when absent) and
/// renumbers both lists.
pub fn move_meal(
    menu: &mut Menu,
    meal_id: &str,
    from: &str,
    to: &str,
    position: Option<usize>,
) -> Result<Meal, AppError> {
    ensure_category(menu, to)?;

    let source = menu
        .items
        .get_mut(from)
        .ok_or_else(|| category_not_found(from))?;
    let mut ordered = sorted_meals(source);
    let index = ordered
        .iter()
        .position(|meal| meal.id == meal_id)
        .ok_or_else(|| meal_not_found(meal_id))?;
    let meal = ordered.remove(index);
    renumber(&mut ordered);
    *source = ordered;

    let target = menu.items.entry(to.to_string()).or_default();
    let mut ordered = sorted_meals(target);
    let at = position.unwrap_or(ordered.len()).min(ordered.len());
    ordered.insert(at, meal);
    renumber(&mut ordered);
    let moved = ordered[at].clone();
    *target = ordered;

    Ok(moved)
}

/// Rewrites `order` to match array position in every category. Returns the
/// ids of the categories that changed.
pub fn normalize_order(menu: &mut Menu) -> Vec<String> {
    let mut changed = Vec::new();

    for (category_id, meals) in menu.items.iter_mut() {
        let needs_update = meals
            .iter()
            .enumerate()
            .any(|(index, meal)| meal.order != Some(index as i64));
        if needs_update {
            renumber(meals);
            changed.push(category_id.clone());
        }
    }

    changed
}

pub fn set_meal_availability(
    menu: &mut Menu,
    category_id: &str,
    meal_id: &str,
    action: AvailabilityAction,
    now: DateTime<Utc>,
    reopen_hour: u32,
) -> Result<Meal, AppError> {
    let meal = find_meal_mut(menu, category_id, meal_id)?;

    let availability = match action {
        AvailabilityAction::Show => Availability::Available,
        AvailabilityAction::Hide => Availability::Hidden { until: None },
        AvailabilityAction::HideUntilTomorrow => Availability::Hidden {
            until: next_reopening(now, reopen_hour),
        },
        AvailabilityAction::MarkUnavailable => Availability::Unavailable { until: None },
        AvailabilityAction::UnavailableUntilTomorrow => Availability::Unavailable {
            until: next_reopening(now, reopen_hour),
        },
    };

    meal.set_availability(availability);
    Ok(meal.clone())
}

/// Tomorrow at `hour`:00 UTC.
pub fn next_reopening(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let tomorrow = now.date_naive().checked_add_days(Days::new(1))?;
    Some(tomorrow.and_time(time).and_utc())
}

fn validate_meal(meal: &Meal) -> Result<(), AppError> {
    if !meal.name.is_complete() {
        return Err(AppError::BadRequest(
            "meal name is required in both languages".to_string(),
        ));
    }
    if !meal.price.is_finite() || meal.price <= 0.0 {
        return Err(AppError::BadRequest("meal price must be > 0".to_string()));
    }
    Ok(())
}

fn ensure_category(menu: &Menu, id: &str) -> Result<(), AppError> {
    if menu.categories.iter().any(|cat| cat.id == id) {
        Ok(())
    } else {
        Err(category_not_found(id))
    }
}

fn find_meal_mut<'a>(
    menu: &'a mut Menu,
    category_id: &str,
    meal_id: &str,
) -> Result<&'a mut Meal, AppError> {
    menu.items
        .get_mut(category_id)
        .ok_or_else(|| category_not_found(category_id))?
        .iter_mut()
        .find(|meal| meal.id == meal_id)
        .ok_or_else(|| meal_not_found(meal_id))
}

fn ensure_permutation(current: &[&str], requested: &[String], what: &str) -> Result<(), AppError> {
    let current: HashSet<&str> = current.iter().copied().collect();
    let requested_set: HashSet<&str> = requested.iter().map(String::as_str).collect();

    if requested_set.len() != requested.len() || requested_set != current {
        return Err(AppError::BadRequest(format!(
            "reorder must list every one of the {} {what} exactly once",
            current.len()
        )));
    }
    Ok(())
}

fn renumber(meals: &mut [Meal]) {
    for (index, meal) in meals.iter_mut().enumerate() {
        meal.order = Some(index as i64);
    }
}

fn category_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("category {id} not found"))
}

fn meal_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("meal {id} not found"))
}
