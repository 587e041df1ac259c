use serde_json::Value;

use super::{
    amount, currency, field, join, non_empty_array, object, one_of, optional, string,
    string_array, Object, ESCROW_TYPES,
};

const SALE_TYPES: &[&str] = &["SALE", "RENT", "FREE"];
const RELEASE_TYPES: &[&str] = &["BLIND", "ANON"];

pub(super) fn validate(action: &Object) -> Result<(), String> {
    let item = object(field(action, "action", "item")?, "action.item")?;
    information(item)?;

    let seller = object(field(item, "action.item", "seller")?, "action.item.seller")?;
    string(field(seller, "action.item.seller", "address")?, "action.item.seller.address")?;
    string(field(seller, "action.item.seller", "signature")?, "action.item.seller.signature")?;

    payment(item)?;

    if let Some(messaging) = optional(item, "messaging") {
        let messaging = object(messaging, "action.item.messaging")?;
        let options = field(messaging, "action.item.messaging", "options")?;
        let options_path = "action.item.messaging.options";
        for (i, option) in non_empty_array(options, options_path)?.iter().enumerate() {
            let p = format!("{options_path}[{i}]");
            let option = object(option, &p)?;
            string(field(option, &p, "protocol")?, &join(&p, "protocol"))?;
            string(field(option, &p, "publicKey")?, &join(&p, "publicKey"))?;
        }
    }
    Ok(())
}

fn information(item: &Object) -> Result<(), String> {
    let path = "action.item.information";
    let info = object(field(item, "action.item", "information")?, path)?;
    string(field(info, path, "title")?, &join(path, "title"))?;
    for key in ["shortDescription", "longDescription"] {
        if let Some(v) = optional(info, key) {
            string(v, &join(path, key))?;
        }
    }

    let category_path = join(path, "category");
    let category = info
        .get("category")
        .ok_or_else(|| format!("{category_path}: not an array"))?;
    non_empty_array(category, &category_path)?;
    string_array(category, &category_path)?;

    if let Some(location) = optional(info, "location") {
        let location_path = join(path, "location");
        let location = object(location, &location_path)?;
        string(field(location, &location_path, "country")?, &join(&location_path, "country"))?;
    }
    if let Some(destinations) = optional(info, "shippingDestinations") {
        string_array(destinations, &join(path, "shippingDestinations"))?;
    }
    if let Some(images) = optional(info, "images") {
        let images_path = join(path, "images");
        for (i, image) in super::array(images, &images_path)?.iter().enumerate() {
            content_reference(image, &format!("{images_path}[{i}]"))?;
        }
    }
    Ok(())
}

fn content_reference(value: &Value, path: &str) -> Result<(), String> {
    let obj = object(value, path)?;
    string(field(obj, path, "hash")?, &join(path, "hash"))?;
    let data_path = join(path, "data");
    let data = obj
        .get("data")
        .ok_or_else(|| format!("{data_path}: not an array"))?;
    for (i, source) in non_empty_array(data, &data_path)?.iter().enumerate() {
        let p = format!("{data_path}[{i}]");
        let source = object(source, &p)?;
        string(field(source, &p, "protocol")?, &join(&p, "protocol"))?;
        string(field(source, &p, "dataId")?, &join(&p, "dataId"))?;
        for key in ["encoding", "data"] {
            if let Some(v) = optional(source, key) {
                string(v, &join(&p, key))?;
            }
        }
    }
    Ok(())
}

fn payment(item: &Object) -> Result<(), String> {
    let path = "action.item.payment";
    let payment = object(field(item, "action.item", "payment")?, path)?;
    one_of(field(payment, path, "type")?, &join(path, "type"), SALE_TYPES)?;
    escrow(payment)?;

    let options_path = join(path, "options");
    let options = payment
        .get("options")
        .ok_or_else(|| format!("{options_path}: not an array"))?;
    for option in non_empty_array(options, &options_path)? {
        payment_option(option, &options_path)?;
    }
    Ok(())
}

fn escrow(payment: &Object) -> Result<(), String> {
    let path = "action.item.payment.escrow";
    let escrow = object(field(payment, "action.item.payment", "escrow")?, path)?;
    one_of(field(escrow, path, "type")?, &join(path, "type"), ESCROW_TYPES)?;

    let ratio_path = join(path, "ratio");
    let ratio = object(field(escrow, path, "ratio")?, &ratio_path)?;
    let percentage = |key: &str| {
        ratio
            .get(key)
            .and_then(Value::as_f64)
            .filter(|p| (0.0..=100.0).contains(p))
    };
    if percentage("buyer").is_none() || percentage("seller").is_none() {
        return Err(format!("{ratio_path}: invalid percentages"));
    }

    if let Some(secs) = optional(escrow, "secondsToLock") {
        if !matches!(secs.as_u64(), Some(s) if s > 0) {
            return Err(format!("{path}.secondsToLock: not a positive integer"));
        }
    }
    if let Some(release) = optional(escrow, "releaseType") {
        one_of(release, &join(path, "releaseType"), RELEASE_TYPES)?;
    }
    Ok(())
}

/// Errors are reported against the options array as a whole, not the index.
fn payment_option(value: &Value, path: &str) -> Result<(), String> {
    let option = object(value, path)?;
    let currency = currency(field(option, path, "currency")?, &join(path, "currency"))?;

    let faulty_price = || format!("{path}: faulty basePrice (< 0, fractional or overflow)");
    let base = option.get("basePrice").ok_or_else(faulty_price)?;
    amount(base, path, "basePrice", Some(currency))?;

    if let Some(shipping) = optional(option, "shippingPrice") {
        let shipping = object(shipping, &join(path, "shippingPrice"))?;
        for (key, what) in [
            ("domestic", "domestic shipping price"),
            ("international", "international shipping price"),
        ] {
            let price = shipping.get(key).unwrap_or(&Value::Null);
            amount(price, path, what, Some(currency))?;
        }
    }

    if let Some(address) = optional(option, "address") {
        let address_path = join(path, "address");
        let address = object(address, &address_path)?;
        string(field(address, &address_path, "type")?, &join(&address_path, "type"))?;
        string(field(address, &address_path, "address")?, &join(&address_path, "address"))?;
    }
    Ok(())
}
