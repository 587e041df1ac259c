use super::{
    currency, destination, field, hash, hex_string, integer, join, non_empty_array, object,
    one_of, optional, output, prevouts, string, Object, ESCROW_TYPES,
};

const ADDRESS_FIELDS: &[&str] = &[
    "firstName",
    "lastName",
    "addressLine1",
    "city",
    "state",
    "zipCode",
    "country",
];

pub(super) fn validate(action: &Object) -> Result<(), String> {
    hash(field(action, "action", "item")?, "action.item")?;
    let buyer = object(field(action, "action", "buyer")?, "action.buyer")?;

    let address_path = "action.buyer.shippingAddress";
    let address = object(field(buyer, "action.buyer", "shippingAddress")?, address_path)?;
    for key in ADDRESS_FIELDS {
        string(field(address, address_path, key)?, &join(address_path, key))?;
    }
    if let Some(line2) = optional(address, "addressLine2") {
        string(line2, &join(address_path, "addressLine2"))?;
    }

    let path = "action.buyer.payment";
    let payment = object(field(buyer, "action.buyer", "payment")?, path)?;
    let currency = currency(
        field(payment, path, "cryptocurrency")?,
        &join(path, "cryptocurrency"),
    )?;
    one_of(field(payment, path, "escrow")?, &join(path, "escrow"), ESCROW_TYPES)?;
    integer(field(payment, path, "shippingPrice")?, &join(path, "shippingPrice"))?;
    hex_string(field(payment, path, "pubKey")?, &join(path, "pubKey"))?;

    let inputs_path = join(path, "inputs");
    let inputs = payment
        .get("inputs")
        .ok_or_else(|| format!("{inputs_path}: not an array"))?;
    non_empty_array(inputs, &inputs_path)?;
    prevouts(inputs, &inputs_path, Some(currency))?;

    if let Some(change) = optional(payment, "changeOutput") {
        output(change, &join(path, "changeOutput"), Some(currency))?;
    }
    if let Some(release) = optional(payment, "releaseOutput") {
        destination(release, &join(path, "releaseOutput"))?;
    }
    destination(field(payment, path, "refundOutput")?, &join(path, "refundOutput"))
}
