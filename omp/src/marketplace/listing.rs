use serde::{Deserialize, Serialize};

use super::message::{MarketAction, MarketplaceMessage};
use super::types::{Cryptocurrency, EscrowType, OutputType, SaleType};
use crate::config::PROTOCOL_VERSION;
use crate::traits::{SystemTimeProvider, TimeProvider};

/// `MPA_LISTING_ADD`: a seller's immutable offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingAddAction {
    /// Milliseconds since the Unix epoch.
    pub generated: u64,
    pub item: ListingItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingItem {
    pub information: ItemInformation,
    pub seller: SellerInfo,
    pub payment: PaymentInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging: Option<MessagingInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInformation {
    pub title: String,
    pub short_description: String,
    pub long_description: String,
    /// Category path from the root, never empty.
    pub category: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Country codes; a leading `-` excludes that country.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shipping_destinations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ContentReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub country: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Hash-addressed content such as an image, with where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReference {
    pub hash: String,
    pub data: Vec<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// `URL`, `FILE`, ...
    pub protocol: String,
    pub data_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerInfo {
    pub address: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(rename = "type")]
    pub sale_type: SaleType,
    pub escrow: EscrowConfig,
    pub options: Vec<PaymentOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowConfig {
    #[serde(rename = "type")]
    pub escrow_type: EscrowType,
    pub ratio: EscrowRatio,
    /// Overrides the policy's destroy lock window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_to_lock: Option<u64>,
    /// Output type of release/refund outputs (`MAD_CT` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_type: Option<OutputType>,
}

/// Bond weights in percent. Kept as `f64` on the wire so out-of-range and
/// fractional values can be reported instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EscrowRatio {
    pub buyer: f64,
    pub seller: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    pub currency: Cryptocurrency,
    /// Integer minor units.
    pub base_price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_price: Option<ShippingPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<PaymentAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPrice {
    pub domestic: u64,
    pub international: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingInfo {
    pub options: Vec<MessagingOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingOption {
    pub protocol: String,
    pub public_key: String,
}

impl ListingAddAction {
    /// Create a new listing builder
    pub fn builder() -> ListingBuilder<SystemTimeProvider> {
        ListingBuilder::new(SystemTimeProvider::new())
    }

    /// Create a new listing builder with a custom time provider
    pub fn builder_with_time<T: TimeProvider>(time: T) -> ListingBuilder<T> {
        ListingBuilder::new(time)
    }

    pub fn escrow(&self) -> &EscrowConfig {
        &self.item.payment.escrow
    }

    /// Payment option for `currency`, if the seller accepts it.
    pub fn payment_option(&self, currency: Cryptocurrency) -> Option<&PaymentOption> {
        self.item
            .payment
            .options
            .iter()
            .find(|o| o.currency == currency)
    }

    /// Whether the seller ships to `country`.
    ///
    /// Entries prefixed with `-` exclude a country. If any plain entries are
    /// present the country must be one of them.
    pub fn ships_to(&self, country: &str) -> bool {
        let destinations = &self.item.information.shipping_destinations;
        let excluded = destinations
            .iter()
            .filter_map(|d| d.strip_prefix('-'))
            .any(|d| d.eq_ignore_ascii_case(country));
        if excluded {
            return false;
        }
        let mut included = destinations.iter().filter(|d| !d.starts_with('-')).peekable();
        included.peek().is_none() || included.any(|d| d.eq_ignore_ascii_case(country))
    }

    /// Shipping price owed for delivery to `country` under `option`.
    ///
    /// Domestic when the country matches the item location, international
    /// otherwise; zero when the listing states no location or no price.
    pub fn shipping_price_for(&self, option: &PaymentOption, country: &str) -> u64 {
        let (Some(price), Some(location)) =
            (option.shipping_price, self.item.information.location.as_ref())
        else {
            return 0;
        };
        if location.country.eq_ignore_ascii_case(country) {
            price.domestic
        } else {
            price.international
        }
    }
}

/// Builder for creating new listings
pub struct ListingBuilder<T: TimeProvider> {
    time: T,
    title: Option<String>,
    short_description: String,
    long_description: String,
    category: Vec<String>,
    location: Option<Location>,
    shipping_destinations: Vec<String>,
    seller: Option<SellerInfo>,
    sale_type: SaleType,
    escrow_type: EscrowType,
    ratio: EscrowRatio,
    seconds_to_lock: Option<u64>,
    release_type: Option<OutputType>,
    options: Vec<PaymentOption>,
}

impl<T: TimeProvider> ListingBuilder<T> {
    /// Create a new builder with a time provider
    pub fn new(time: T) -> Self {
        Self {
            time,
            title: None,
            short_description: String::new(),
            long_description: String::new(),
            category: Vec::new(),
            location: None,
            shipping_destinations: Vec::new(),
            seller: None,
            sale_type: SaleType::Sale,
            escrow_type: EscrowType::MadCt,
            ratio: EscrowRatio {
                buyer: 100.0,
                seller: 100.0,
            },
            seconds_to_lock: None,
            release_type: None,
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn descriptions(mut self, short: impl Into<String>, long: impl Into<String>) -> Self {
        self.short_description = short.into();
        self.long_description = long.into();
        self
    }

    #[must_use]
    pub fn category<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.category = path.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn location(mut self, country: impl Into<String>) -> Self {
        self.location = Some(Location {
            country: country.into(),
            address: None,
        });
        self
    }

    #[must_use]
    pub fn ships_to(mut self, destination: impl Into<String>) -> Self {
        self.shipping_destinations.push(destination.into());
        self
    }

    #[must_use]
    pub fn seller(mut self, address: impl Into<String>, signature: impl Into<String>) -> Self {
        self.seller = Some(SellerInfo {
            address: address.into(),
            signature: signature.into(),
        });
        self
    }

    #[must_use]
    pub const fn sale_type(mut self, sale_type: SaleType) -> Self {
        self.sale_type = sale_type;
        self
    }

    #[must_use]
    pub fn escrow(mut self, escrow_type: EscrowType, buyer: f64, seller: f64) -> Self {
        self.escrow_type = escrow_type;
        self.ratio = EscrowRatio { buyer, seller };
        self
    }

    #[must_use]
    pub const fn seconds_to_lock(mut self, seconds: u64) -> Self {
        self.seconds_to_lock = Some(seconds);
        self
    }

    #[must_use]
    pub const fn release_type(mut self, release_type: OutputType) -> Self {
        self.release_type = Some(release_type);
        self
    }

    /// Add a payment option; `shipping` is `(domestic, international)`.
    #[must_use]
    pub fn price(
        mut self,
        currency: Cryptocurrency,
        base_price: u64,
        shipping: Option<(u64, u64)>,
    ) -> Self {
        self.options.push(PaymentOption {
            currency,
            base_price,
            shipping_price: shipping.map(|(domestic, international)| ShippingPrice {
                domestic,
                international,
            }),
            address: None,
        });
        self
    }

    /// Build the listing message (returns error if required fields are missing)
    pub fn build(self) -> Result<MarketplaceMessage, String> {
        if self.category.is_empty() {
            return Err("category is required".into());
        }
        if self.options.is_empty() {
            return Err("at least one payment option is required".into());
        }
        let listing = ListingAddAction {
            generated: self.time.now_millis(),
            item: ListingItem {
                information: ItemInformation {
                    title: self.title.ok_or("title is required")?,
                    short_description: self.short_description,
                    long_description: self.long_description,
                    category: self.category,
                    location: self.location,
                    shipping_destinations: self.shipping_destinations,
                    images: Vec::new(),
                },
                seller: self.seller.ok_or("seller is required")?,
                payment: PaymentInfo {
                    sale_type: self.sale_type,
                    escrow: EscrowConfig {
                        escrow_type: self.escrow_type,
                        ratio: self.ratio,
                        seconds_to_lock: self.seconds_to_lock,
                        release_type: self.release_type,
                    },
                    options: self.options,
                },
                messaging: None,
                objects: Vec::new(),
            },
            hash: None,
        };
        Ok(MarketplaceMessage {
            version: PROTOCOL_VERSION.to_string(),
            action: MarketAction::ListingAdd(listing),
        })
    }
}
