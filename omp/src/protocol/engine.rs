//! The round operations of the MAD escrow protocol.
//!
//! Every round is a pure function of the messages it is handed plus live
//! queries to the party's node. Nothing is cached between rounds: each one
//! re-derives the templates it needs and compares them with what the
//! counterparty sent.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::derivation::{
    change_amount, check_bid, check_seller, templates_from_counterparty, terms_for_bid, Templates,
};
use super::wallet_lock::WalletLocks;
use crate::config::{
    EscrowPolicy, Network, FEE_SELECTION_MAX_PASSES, FUNDING_INPUT_BYTES, FUNDING_OUTPUT_BYTES,
    FUNDING_TX_BASE_BYTES, SETTLEMENT_TX_ESTIMATED_BYTES,
};
use crate::error::{OmpError, OmpResult};
use crate::escrow::{self, EscrowTerms};
use crate::marketplace::{
    hash_message, AcceptAction, BidAction, BidConfiguration, BuyerData, BuyerPayment,
    BuyerSignatures, Cryptocurrency, DestroyTerms, ListingAddAction, LockAction, MarketAction,
    MarketplaceMessage, SellerData, SignatureSet,
};
use crate::traits::{BroadcastRejection, MessageValidator, NodeAdapter, SystemTimeProvider, TimeProvider};
use crate::transaction::templates::{self, FundingTerms};
use crate::transaction::{
    select_outputs, witness, OutPoint, Prevout, RawTransaction, Script, SignatureShare,
    SigningInput, TxOutput,
};
use crate::validation::FormatValidator;

/// Protocol engine for one party.
///
/// Holds no trade state: callers pass the full message history into each
/// round. Concurrent rounds are safe; rounds touching the same wallet are
/// serialized around output selection and signing.
pub struct OpenMarketProtocol {
    network: Network,
    policy: EscrowPolicy,
    backends: HashMap<Cryptocurrency, Arc<dyn NodeAdapter>>,
    validator: Arc<dyn MessageValidator>,
    time: Arc<dyn TimeProvider>,
    wallet_locks: WalletLocks,
}

/// Builder for [`OpenMarketProtocol`].
pub struct ProtocolBuilder {
    network: Network,
    policy: Option<EscrowPolicy>,
    backends: HashMap<Cryptocurrency, Arc<dyn NodeAdapter>>,
    validator: Option<Arc<dyn MessageValidator>>,
    time: Option<Arc<dyn TimeProvider>>,
}

impl ProtocolBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            policy: None,
            backends: HashMap::new(),
            validator: None,
            time: None,
        }
    }

    /// Escrow policy; defaults to [`EscrowPolicy::for_network`].
    pub fn policy(mut self, policy: EscrowPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Node adapter serving `currency`. Replaces any earlier one.
    pub fn backend(mut self, currency: Cryptocurrency, adapter: Arc<dyn NodeAdapter>) -> Self {
        self.backends.insert(currency, adapter);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Clock for message timestamps.
    pub fn time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn build(self) -> OpenMarketProtocol {
        OpenMarketProtocol {
            network: self.network,
            policy: self
                .policy
                .unwrap_or_else(|| EscrowPolicy::for_network(self.network)),
            backends: self.backends,
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(FormatValidator::new())),
            time: self
                .time
                .unwrap_or_else(|| Arc::new(SystemTimeProvider::new())),
            wallet_locks: WalletLocks::new(),
        }
    }
}

/// Listing, bid and derived terms shared by every round after `bid`.
struct TradeView<'a> {
    listing: &'a ListingAddAction,
    bid: &'a BidAction,
    bid_hash: String,
    terms: EscrowTerms,
    currency: Cryptocurrency,
    adapter: Arc<dyn NodeAdapter>,
}

impl TradeView<'_> {
    fn payment(&self) -> &BuyerPayment {
        self.bid.payment()
    }
}

impl OpenMarketProtocol {
    pub fn builder(network: Network) -> ProtocolBuilder {
        ProtocolBuilder::new(network)
    }

    pub const fn network(&self) -> Network {
        self.network
    }

    pub const fn policy(&self) -> &EscrowPolicy {
        &self.policy
    }

    /// Node adapter configured for `currency`.
    pub fn adapter(&self, currency: Cryptocurrency) -> OmpResult<Arc<dyn NodeAdapter>> {
        self.backends
            .get(&currency)
            .cloned()
            .ok_or(OmpError::UnknownCurrency(currency))
    }

    /// Buyer: answer `listing` with a bid funded from `wallet`.
    ///
    /// The selected outputs stay reserved in the wallet until the funding
    /// transaction spends them. Any failure after reservation releases them.
    pub async fn bid(
        &self,
        wallet: &str,
        config: &BidConfiguration,
        listing_msg: &MarketplaceMessage,
    ) -> OmpResult<MarketplaceMessage> {
        let listing = listing_of(listing_msg)?;
        self.validate(listing_msg, OmpError::InvalidListing)?;
        let escrow_type = listing.escrow().escrow_type;
        escrow::ensure_supported(escrow_type)?;
        if config.escrow != escrow_type {
            return Err(OmpError::EscrowMismatch(format!(
                "bid wants {} but the listing offers {}",
                config.escrow, escrow_type
            )));
        }

        let terms = EscrowTerms::derive(
            listing,
            config.cryptocurrency,
            &config.shipping_address.country,
            &self.policy,
        )?;
        let listing_hash = hash_message(listing_msg)?;
        let adapter = self.adapter(config.cryptocurrency)?;
        let contribution = terms.buyer_contribution()?;

        let _guard = self
            .wallet_locks
            .acquire(config.cryptocurrency, wallet)
            .await;
        let candidates = adapter
            .list_unspent(wallet, terms.output_types.funding, self.policy.min_confirmations)
            .await
            .map_err(node_err("listing unspent outputs"))?;
        let inputs = select_outputs(&candidates, contribution)?;
        let outpoints = outpoints(&inputs);
        adapter
            .lock_unspent(wallet, false, &outpoints)
            .await
            .map_err(node_err("reserving outputs"))?;

        match self
            .build_bid(adapter.as_ref(), wallet, config, &terms, listing_hash.clone(), inputs)
            .await
        {
            Ok(msg) => {
                info!(
                    "Bid on {} for {} ({} {}), {} inputs reserved",
                    short(&listing_hash),
                    contribution,
                    config.cryptocurrency,
                    escrow_type,
                    outpoints.len()
                );
                Ok(msg)
            }
            Err(e) => {
                release_reservation(adapter.as_ref(), wallet, &outpoints).await;
                Err(e)
            }
        }
    }

    async fn build_bid(
        &self,
        adapter: &dyn NodeAdapter,
        wallet: &str,
        config: &BidConfiguration,
        terms: &EscrowTerms,
        listing_hash: String,
        inputs: Vec<Prevout>,
    ) -> OmpResult<MarketplaceMessage> {
        let types = terms.output_types;
        let contribution = terms.buyer_contribution()?;
        let change = change_amount(&inputs, contribution).ok_or_else(|| {
            OmpError::TransactionBuild(format!("selected inputs do not cover {contribution}"))
        })?;

        let pub_key = adapter
            .get_new_pubkey(wallet)
            .await
            .map_err(node_err("creating escrow key"))?;
        let change_output = if change > 0 {
            Some(new_destination(adapter, wallet, types.funding).await?.with_amount(change))
        } else {
            None
        };
        let release_output = new_destination(adapter, wallet, types.settlement).await?;
        let refund_output = new_destination(adapter, wallet, types.settlement).await?;

        // Seller key is not known yet: the skeleton commits to the buyer side only.
        let skeleton = templates::funding(&FundingTerms {
            buyer_inputs: &inputs,
            seller_inputs: &[],
            escrow: TxOutput {
                output_type: types.escrow,
                amount: terms.total()?,
                script: Script::Multisig {
                    required: 2,
                    pubkeys: vec![pub_key.clone()],
                },
            },
            buyer_change: change_output.as_ref(),
            seller_change: None,
        })?;

        let action = BidAction {
            generated: self.time.now_millis(),
            item: listing_hash,
            buyer: BuyerData {
                shipping_address: config.shipping_address.clone(),
                payment: BuyerPayment {
                    cryptocurrency: config.cryptocurrency,
                    escrow: config.escrow,
                    shipping_price: terms.shipping,
                    pub_key,
                    inputs,
                    change_output,
                    release_output: Some(release_output),
                    refund_output,
                },
            },
            hash: None,
            raw_bid_tx: Some(skeleton.to_hex()?),
        };
        seal(action.into())
    }

    /// Seller: accept `bid`, funding the seller bond from `wallet`.
    ///
    /// The accept carries the seller's destroy and release signatures. The
    /// seller's funding signatures stay in the local `_rawbidtx` until
    /// [`complete`](Self::complete).
    pub async fn accept(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
    ) -> OmpResult<MarketplaceMessage> {
        let view = self.prepare(listing_msg, bid_msg)?;
        check_bid(view.listing, view.bid, &view.terms)?;
        let adapter = view.adapter.clone();

        let fee = adapter
            .estimate_fee(SETTLEMENT_TX_ESTIMATED_BYTES)
            .await
            .map_err(node_err("estimating settlement fee"))?;
        if fee > self.policy.max_settlement_fee {
            return Err(OmpError::TransactionBuild(format!(
                "settlement fee {fee} exceeds the policy maximum {}",
                self.policy.max_settlement_fee
            )));
        }
        let chain = adapter
            .blockchain_info()
            .await
            .map_err(node_err("querying chain state"))?;
        let unlock_time = view.terms.unlock_time(chain.median_time)?;

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;
        let candidates = adapter
            .list_unspent(
                wallet,
                view.terms.output_types.funding,
                self.policy.min_confirmations,
            )
            .await
            .map_err(node_err("listing unspent outputs"))?;
        let (inputs, funding_fee) = self
            .select_seller_inputs(adapter.as_ref(), &candidates, &view)
            .await?;
        let outpoints = outpoints(&inputs);
        adapter
            .lock_unspent(wallet, false, &outpoints)
            .await
            .map_err(node_err("reserving outputs"))?;

        let seller_terms = SellerTerms {
            inputs,
            fee,
            funding_fee,
            unlock_time,
        };
        match self.build_accept(wallet, &view, seller_terms).await {
            Ok(msg) => {
                info!(
                    "Accepted bid {}: fee {}, funding fee {}, destroy unlocks at {}",
                    short(&view.bid_hash),
                    fee,
                    funding_fee,
                    unlock_time
                );
                Ok(msg)
            }
            Err(e) => {
                release_reservation(adapter.as_ref(), wallet, &outpoints).await;
                Err(e)
            }
        }
    }

    /// Pick seller inputs for the bond plus a funding fee that depends on how
    /// many inputs get picked.
    async fn select_seller_inputs(
        &self,
        adapter: &dyn NodeAdapter,
        candidates: &[Prevout],
        view: &TradeView<'_>,
    ) -> OmpResult<(Vec<Prevout>, u64)> {
        let payment = view.payment();
        let outputs = 2 + usize::from(payment.change_output.is_some());
        let bond = view.terms.seller_contribution();
        let mut seller_inputs = 1;
        for pass in 0..FEE_SELECTION_MAX_PASSES {
            let size = FUNDING_TX_BASE_BYTES
                + (payment.inputs.len() + seller_inputs) * FUNDING_INPUT_BYTES
                + outputs * FUNDING_OUTPUT_BYTES;
            let fee = adapter
                .estimate_fee(size)
                .await
                .map_err(node_err("estimating funding fee"))?;
            let target = bond.checked_add(fee).ok_or_else(|| {
                OmpError::TransactionBuild("seller bond plus fee overflows".into())
            })?;
            let selected = select_outputs(candidates, target)?;
            debug!(
                "Funding selection pass {}: {} inputs for {}",
                pass,
                selected.len(),
                target
            );
            if selected.len() <= seller_inputs {
                return Ok((selected, fee));
            }
            seller_inputs = selected.len();
        }
        Err(OmpError::TransactionBuild(format!(
            "funding fee did not settle after {FEE_SELECTION_MAX_PASSES} passes"
        )))
    }

    async fn build_accept(
        &self,
        wallet: &str,
        view: &TradeView<'_>,
        seller_terms: SellerTerms,
    ) -> OmpResult<MarketplaceMessage> {
        let adapter = view.adapter.as_ref();
        let types = view.terms.output_types;
        let needed = view
            .terms
            .seller_contribution()
            .checked_add(seller_terms.funding_fee)
            .ok_or_else(|| OmpError::TransactionBuild("seller funding overflows".into()))?;
        let change = change_amount(&seller_terms.inputs, needed).ok_or_else(|| {
            OmpError::TransactionBuild(format!("selected inputs do not cover {needed}"))
        })?;

        let pub_key = adapter
            .get_new_pubkey(wallet)
            .await
            .map_err(node_err("creating escrow key"))?;
        let change_output = if change > 0 {
            Some(new_destination(adapter, wallet, types.funding).await?.with_amount(change))
        } else {
            None
        };
        let release_output = new_destination(adapter, wallet, types.settlement).await?;
        let refund_output = new_destination(adapter, wallet, types.settlement).await?;

        let mut seller = SellerData {
            pub_key,
            inputs: seller_terms.inputs,
            change_output,
            release_output: Some(release_output),
            refund_output: Some(refund_output),
            fee: seller_terms.fee,
            funding_fee: seller_terms.funding_fee,
            destroy: DestroyTerms {
                unlock_time: seller_terms.unlock_time,
                signatures: Vec::new(),
            },
            release: SignatureSet::default(),
        };
        let t = Templates::build(&view.terms, view.payment(), &seller)?;
        let escrow = t.escrow_prevouts();
        let buyer_inputs = view.payment().inputs.len();

        let funding_shares = sign(
            adapter,
            wallet,
            &t.funding,
            &t.funding_prevouts,
            buyer_inputs..t.funding_prevouts.len(),
        )
        .await?;
        let destroy_shares = sign(adapter, wallet, &t.destroy, &escrow, 0..1).await?;
        let release_shares = sign(adapter, wallet, &t.release, &escrow, 0..1).await?;

        let raw_bid_tx =
            witness::combine(&t.funding.to_hex()?, &t.funding_prevouts, &funding_shares)?;
        let raw_dest_tx = witness::combine(&t.destroy.to_hex()?, &escrow, &destroy_shares)?;
        let raw_release_tx = witness::combine(&t.release.to_hex()?, &escrow, &release_shares)?;

        seller.destroy.signatures = destroy_shares;
        seller.release.signatures = release_shares;

        let action = AcceptAction {
            generated: self.time.now_millis(),
            bid: view.bid_hash.clone(),
            seller,
            release_tx_unsigned: t.release.unsigned_hex()?,
            hash: None,
            raw_bid_tx: Some(raw_bid_tx),
            raw_dest_tx: Some(raw_dest_tx),
            raw_release_tx: Some(raw_release_tx),
        };
        seal(action.into())
    }

    /// Buyer: check the seller's accept against our own derivation and sign
    /// the funding inputs, the destroy and the refund.
    pub async fn lock(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
        accept_msg: &MarketplaceMessage,
    ) -> OmpResult<MarketplaceMessage> {
        let view = self.prepare(listing_msg, bid_msg)?;
        let accept = self.accept_of(accept_msg, &view)?;
        let adapter = view.adapter.as_ref();
        let seller = &accept.seller;

        let chain = adapter
            .blockchain_info()
            .await
            .map_err(node_err("querying chain state"))?;
        check_seller(view.bid, seller, &view.terms, &self.policy, chain.median_time)?;
        let t = templates_from_counterparty(&view.terms, view.payment(), seller)?;
        let release_unsigned = t.release.unsigned_hex()?;
        if release_unsigned != accept.release_tx_unsigned {
            return Err(OmpError::ProtocolViolation(
                "release template differs from the one derived from the bid".into(),
            ));
        }
        check_share_keys(&seller.destroy.signatures, &seller.pub_key, "seller destroy")?;
        check_share_keys(&seller.release.signatures, &seller.pub_key, "seller release")?;
        let escrow = t.escrow_prevouts();

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;

        let destroy_own = sign(adapter, wallet, &t.destroy, &escrow, 0..1).await?;
        let raw_dest_tx = combine_counterparty(
            &t.destroy,
            &escrow,
            &[seller.destroy.signatures.as_slice(), destroy_own.as_slice()].concat(),
        )?;
        require_complete(adapter, &raw_dest_tx, &escrow, OmpError::ProtocolViolation, "destroy")
            .await?;

        let release_own = sign(adapter, wallet, &t.release, &escrow, 0..1).await?;
        let release_check = combine_counterparty(
            &t.release,
            &escrow,
            &[seller.release.signatures.as_slice(), release_own.as_slice()].concat(),
        )?;
        require_complete(adapter, &release_check, &escrow, OmpError::ProtocolViolation, "release")
            .await?;

        let funding_shares = sign(
            adapter,
            wallet,
            &t.funding,
            &t.funding_prevouts,
            0..view.payment().inputs.len(),
        )
        .await?;
        let raw_bid_tx =
            witness::combine(&t.funding.to_hex()?, &t.funding_prevouts, &funding_shares)?;
        let refund_shares = sign(adapter, wallet, &t.refund, &escrow, 0..1).await?;
        let raw_refund_tx = witness::combine(&t.refund.to_hex()?, &escrow, &refund_shares)?;

        info!(
            "Locked bid {}: escrow {} of {}",
            short(&view.bid_hash),
            t.escrow.amount,
            view.currency
        );
        let action = LockAction {
            generated: self.time.now_millis(),
            bid: view.bid_hash.clone(),
            buyer: BuyerSignatures {
                signatures: funding_shares,
                destroy: SignatureSet {
                    signatures: destroy_own,
                },
                refund: SignatureSet {
                    signatures: refund_shares,
                },
            },
            release_tx_unsigned: release_unsigned,
            hash: None,
            raw_bid_tx: Some(raw_bid_tx),
            raw_dest_tx: Some(raw_dest_tx),
            raw_refund_tx: Some(raw_refund_tx),
        };
        seal(action.into())
    }

    /// Seller: verify the buyer's lock and return the fully signed,
    /// broadcastable funding transaction.
    pub async fn complete(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
        accept_msg: &MarketplaceMessage,
        lock_msg: &MarketplaceMessage,
    ) -> OmpResult<String> {
        let view = self.prepare(listing_msg, bid_msg)?;
        let accept = self.accept_of(accept_msg, &view)?;
        let lock = self.lock_of(lock_msg, &view)?;
        let adapter = view.adapter.as_ref();
        let buyer_key = &view.payment().pub_key;

        let t = Templates::build(&view.terms, view.payment(), &accept.seller)?;
        let release_unsigned = t.release.unsigned_hex()?;
        if release_unsigned != accept.release_tx_unsigned {
            return Err(OmpError::ProtocolViolation(
                "accept does not match the release template derived from the bid".into(),
            ));
        }
        if lock.release_tx_unsigned != release_unsigned {
            return Err(OmpError::ProtocolViolation(
                "lock echoes a different release template".into(),
            ));
        }
        check_share_keys(&lock.buyer.destroy.signatures, buyer_key, "buyer destroy")?;
        check_share_keys(&lock.buyer.refund.signatures, buyer_key, "buyer refund")?;
        let escrow = t.escrow_prevouts();

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;

        let destroy = combine_counterparty(
            &t.destroy,
            &escrow,
            &[
                accept.seller.destroy.signatures.as_slice(),
                lock.buyer.destroy.signatures.as_slice(),
            ]
            .concat(),
        )?;
        require_complete(adapter, &destroy, &escrow, OmpError::ProtocolViolation, "destroy")
            .await?;

        let refund_own = sign(adapter, wallet, &t.refund, &escrow, 0..1).await?;
        let refund = combine_counterparty(
            &t.refund,
            &escrow,
            &[lock.buyer.refund.signatures.as_slice(), refund_own.as_slice()].concat(),
        )?;
        require_complete(adapter, &refund, &escrow, OmpError::ProtocolViolation, "refund").await?;

        let buyer_inputs = view.payment().inputs.len();
        if let Some(share) = lock
            .buyer
            .signatures
            .iter()
            .find(|s| s.input as usize >= buyer_inputs)
        {
            return Err(OmpError::ProtocolViolation(format!(
                "buyer signed funding input {} which is not theirs",
                share.input
            )));
        }
        let buyer_signed =
            combine_counterparty(&t.funding, &t.funding_prevouts, &lock.buyer.signatures)?;
        let seller_shares = sign(
            adapter,
            wallet,
            &t.funding,
            &t.funding_prevouts,
            buyer_inputs..t.funding_prevouts.len(),
        )
        .await?;
        let funding = witness::combine(&buyer_signed, &t.funding_prevouts, &seller_shares)?;
        require_complete(
            adapter,
            &funding,
            &t.funding_prevouts,
            OmpError::IncompleteSignature,
            "funding",
        )
        .await?;

        info!(
            "Completed bid {}: funding tx {}",
            short(&view.bid_hash),
            t.funding.txid()?
        );
        Ok(funding)
    }

    /// Buyer: sign the release template, paying the seller.
    pub async fn release(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
        accept_msg: &MarketplaceMessage,
    ) -> OmpResult<String> {
        let view = self.prepare(listing_msg, bid_msg)?;
        let accept = self.accept_of(accept_msg, &view)?;
        let adapter = view.adapter.as_ref();

        let t = templates_from_counterparty(&view.terms, view.payment(), &accept.seller)?;
        if t.release.unsigned_hex()? != accept.release_tx_unsigned {
            return Err(OmpError::ProtocolViolation(
                "release template differs from the one derived from the bid".into(),
            ));
        }
        check_share_keys(
            &accept.seller.release.signatures,
            &accept.seller.pub_key,
            "seller release",
        )?;
        let escrow = t.escrow_prevouts();

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;
        let own = sign(adapter, wallet, &t.release, &escrow, 0..1).await?;
        let release = combine_counterparty(
            &t.release,
            &escrow,
            &[accept.seller.release.signatures.as_slice(), own.as_slice()].concat(),
        )?;
        require_complete(adapter, &release, &escrow, OmpError::IncompleteSignature, "release")
            .await?;
        info!("Release of bid {} signed", short(&view.bid_hash));
        Ok(release)
    }

    /// Seller: sign the refund template, returning the buyer's funds.
    pub async fn refund(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
        accept_msg: &MarketplaceMessage,
        lock_msg: &MarketplaceMessage,
    ) -> OmpResult<String> {
        let view = self.prepare(listing_msg, bid_msg)?;
        let accept = self.accept_of(accept_msg, &view)?;
        let lock = self.lock_of(lock_msg, &view)?;
        let adapter = view.adapter.as_ref();

        let t = Templates::build(&view.terms, view.payment(), &accept.seller)?;
        if lock.release_tx_unsigned != t.release.unsigned_hex()? {
            return Err(OmpError::ProtocolViolation(
                "lock echoes a different release template".into(),
            ));
        }
        check_share_keys(
            &lock.buyer.refund.signatures,
            &view.payment().pub_key,
            "buyer refund",
        )?;
        let escrow = t.escrow_prevouts();

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;
        let own = sign(adapter, wallet, &t.refund, &escrow, 0..1).await?;
        let refund = combine_counterparty(
            &t.refund,
            &escrow,
            &[lock.buyer.refund.signatures.as_slice(), own.as_slice()].concat(),
        )?;
        require_complete(adapter, &refund, &escrow, OmpError::IncompleteSignature, "refund")
            .await?;
        info!("Refund of bid {} signed", short(&view.bid_hash));
        Ok(refund)
    }

    /// Either party: assemble the fully signed destroy transaction.
    ///
    /// The result only becomes broadcastable once chain median time reaches
    /// the unlock time.
    pub async fn destroy(
        &self,
        wallet: &str,
        listing_msg: &MarketplaceMessage,
        bid_msg: &MarketplaceMessage,
        accept_msg: &MarketplaceMessage,
        lock_msg: &MarketplaceMessage,
    ) -> OmpResult<String> {
        let view = self.prepare(listing_msg, bid_msg)?;
        let accept = self.accept_of(accept_msg, &view)?;
        let lock = self.lock_of(lock_msg, &view)?;
        let adapter = view.adapter.as_ref();

        let t = templates_from_counterparty(&view.terms, view.payment(), &accept.seller)?;
        if t.release.unsigned_hex()? != accept.release_tx_unsigned {
            return Err(OmpError::ProtocolViolation(
                "release template differs from the one derived from the bid".into(),
            ));
        }
        check_share_keys(
            &accept.seller.destroy.signatures,
            &accept.seller.pub_key,
            "seller destroy",
        )?;
        check_share_keys(
            &lock.buyer.destroy.signatures,
            &view.payment().pub_key,
            "buyer destroy",
        )?;
        let escrow = t.escrow_prevouts();

        let _guard = self.wallet_locks.acquire(view.currency, wallet).await;
        let own = sign(adapter, wallet, &t.destroy, &escrow, 0..1).await?;
        let destroy = combine_counterparty(
            &t.destroy,
            &escrow,
            &[
                accept.seller.destroy.signatures.as_slice(),
                lock.buyer.destroy.signatures.as_slice(),
                own.as_slice(),
            ]
            .concat(),
        )?;
        require_complete(adapter, &destroy, &escrow, OmpError::IncompleteSignature, "destroy")
            .await?;
        info!(
            "Destroy of bid {} signed, unlocks at {}",
            short(&view.bid_hash),
            t.destroy.lock_time
        );
        Ok(destroy)
    }

    /// Submit a fully signed transaction through the node for `currency`.
    pub async fn broadcast(&self, currency: Cryptocurrency, raw_hex: &str) -> OmpResult<String> {
        let adapter = self.adapter(currency)?;
        match adapter.send_raw_transaction(raw_hex).await {
            Ok(txid) => {
                info!("Broadcast {} on {}", txid, currency);
                Ok(txid)
            }
            Err(e) => {
                if let Some(BroadcastRejection::NonFinal {
                    lock_time,
                    median_time,
                }) = e.downcast_ref::<BroadcastRejection>()
                {
                    return Err(OmpError::PrematureBroadcast(format!(
                        "lock time {lock_time} not reached, chain median time is {median_time}"
                    )));
                }
                warn!("Broadcast on {} rejected: {:#}", currency, e);
                Err(OmpError::Other(e.context("broadcast rejected")))
            }
        }
    }

    fn validate(
        &self,
        msg: &MarketplaceMessage,
        reject: fn(String) -> OmpError,
    ) -> OmpResult<()> {
        let value = serde_json::to_value(msg)?;
        self.validator.validate(&value).map_err(reject)
    }

    /// Validate listing and bid, check the bid points at the listing and
    /// derive the terms.
    fn prepare<'a>(
        &self,
        listing_msg: &'a MarketplaceMessage,
        bid_msg: &'a MarketplaceMessage,
    ) -> OmpResult<TradeView<'a>> {
        let listing = listing_of(listing_msg)?;
        self.validate(listing_msg, OmpError::InvalidListing)?;
        escrow::ensure_supported(listing.escrow().escrow_type)?;
        let bid = bid_msg.action.bid().ok_or_else(|| {
            OmpError::InvalidBid(format!("expected MPA_BID, got {}", bid_msg.action.kind()))
        })?;
        self.validate(bid_msg, OmpError::InvalidBid)?;

        let listing_hash = hash_message(listing_msg)?;
        if bid.item != listing_hash {
            return Err(OmpError::InvalidBid(format!(
                "bid is for listing {}, not {}",
                short(&bid.item),
                short(&listing_hash)
            )));
        }
        let terms = terms_for_bid(listing, bid, &self.policy)?;
        let currency = bid.payment().cryptocurrency;
        Ok(TradeView {
            listing,
            bid,
            bid_hash: hash_message(bid_msg)?,
            terms,
            currency,
            adapter: self.adapter(currency)?,
        })
    }

    fn accept_of<'a>(
        &self,
        msg: &'a MarketplaceMessage,
        view: &TradeView<'_>,
    ) -> OmpResult<&'a AcceptAction> {
        let accept = msg.action.accept().ok_or_else(|| {
            OmpError::ProtocolViolation(format!("expected MPA_ACCEPT, got {}", msg.action.kind()))
        })?;
        self.validate(msg, OmpError::ProtocolViolation)?;
        if accept.bid != view.bid_hash {
            return Err(OmpError::ProtocolViolation(format!(
                "accept is for bid {}, not {}",
                short(&accept.bid),
                short(&view.bid_hash)
            )));
        }
        Ok(accept)
    }

    fn lock_of<'a>(
        &self,
        msg: &'a MarketplaceMessage,
        view: &TradeView<'_>,
    ) -> OmpResult<&'a LockAction> {
        let lock = msg.action.lock().ok_or_else(|| {
            OmpError::ProtocolViolation(format!("expected MPA_LOCK, got {}", msg.action.kind()))
        })?;
        self.validate(msg, OmpError::ProtocolViolation)?;
        if lock.bid != view.bid_hash {
            return Err(OmpError::ProtocolViolation(format!(
                "lock is for bid {}, not {}",
                short(&lock.bid),
                short(&view.bid_hash)
            )));
        }
        Ok(lock)
    }
}

/// What the seller decided during input selection.
struct SellerTerms {
    inputs: Vec<Prevout>,
    fee: u64,
    funding_fee: u64,
    unlock_time: u32,
}

fn listing_of(msg: &MarketplaceMessage) -> OmpResult<&ListingAddAction> {
    msg.action.listing().ok_or_else(|| {
        OmpError::InvalidListing(format!(
            "expected MPA_LISTING_ADD, got {}",
            msg.action.kind()
        ))
    })
}

/// Attach the message's own fingerprint.
fn seal(mut msg: MarketplaceMessage) -> OmpResult<MarketplaceMessage> {
    let hash = hash_message(&msg)?;
    match &mut msg.action {
        MarketAction::ListingAdd(a) => a.hash = Some(hash),
        MarketAction::Bid(a) => a.hash = Some(hash),
        MarketAction::Accept(a) => a.hash = Some(hash),
        MarketAction::Lock(a) => a.hash = Some(hash),
    }
    Ok(msg)
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn outpoints(prevouts: &[Prevout]) -> Vec<OutPoint> {
    prevouts.iter().map(Prevout::outpoint).collect()
}

fn node_err(context: &'static str) -> impl Fn(anyhow::Error) -> OmpError {
    move |e| OmpError::TransactionBuild(format!("{context}: {e:#}"))
}

async fn new_destination(
    adapter: &dyn NodeAdapter,
    wallet: &str,
    output_type: crate::marketplace::OutputType,
) -> OmpResult<crate::transaction::Destination> {
    adapter
        .get_new_destination(wallet, output_type)
        .await
        .map_err(node_err("creating destination"))
}

async fn release_reservation(adapter: &dyn NodeAdapter, wallet: &str, outpoints: &[OutPoint]) {
    if let Err(e) = adapter.lock_unspent(wallet, true, outpoints).await {
        warn!("Failed to release {} reserved outputs: {:#}", outpoints.len(), e);
    }
}

/// Have the node sign `indices` of `tx`.
async fn sign(
    adapter: &dyn NodeAdapter,
    wallet: &str,
    tx: &RawTransaction,
    prevouts: &[Prevout],
    indices: Range<usize>,
) -> OmpResult<Vec<SignatureShare>> {
    let inputs = indices
        .map(|index| {
            let prevout = prevouts.get(index).ok_or_else(|| {
                OmpError::TransactionBuild(format!("no prevout for input {index}"))
            })?;
            Ok(SigningInput {
                index: index as u32,
                prevout: prevout.clone(),
            })
        })
        .collect::<OmpResult<Vec<_>>>()?;
    if inputs.is_empty() {
        return Ok(Vec::new());
    }
    let shares = adapter
        .sign_inputs(wallet, &tx.unsigned_hex()?, &inputs)
        .await
        .map_err(node_err("signing"))?;
    if shares.len() != inputs.len() {
        return Err(OmpError::IncompleteSignature(format!(
            "node returned {} signatures for {} inputs",
            shares.len(),
            inputs.len()
        )));
    }
    Ok(shares)
}

/// Merge shares that include counterparty data; a share that does not fit
/// the template is the counterparty's fault.
fn combine_counterparty(
    tx: &RawTransaction,
    prevouts: &[Prevout],
    shares: &[SignatureShare],
) -> OmpResult<String> {
    witness::combine(&tx.to_hex()?, prevouts, shares).map_err(|e| match e {
        OmpError::TransactionBuild(msg) => OmpError::ProtocolViolation(msg),
        other => other,
    })
}

fn check_share_keys(shares: &[SignatureShare], key: &str, what: &str) -> OmpResult<()> {
    if shares.is_empty() {
        return Err(OmpError::ProtocolViolation(format!("{what} signature missing")));
    }
    match shares.iter().find(|s| s.pub_key != key || s.input != 0) {
        Some(s) => Err(OmpError::ProtocolViolation(format!(
            "{what} signature for input {} by unexpected key {}",
            s.input, s.pub_key
        ))),
        None => Ok(()),
    }
}

async fn require_complete(
    adapter: &dyn NodeAdapter,
    raw_hex: &str,
    prevouts: &[Prevout],
    reject: fn(String) -> OmpError,
    what: &str,
) -> OmpResult<()> {
    let verification = adapter
        .verify_raw_transaction(raw_hex, prevouts)
        .await
        .map_err(node_err("verifying transaction"))?;
    if verification.complete {
        Ok(())
    } else {
        Err(reject(format!(
            "{what} transaction not fully signed: {}",
            verification.errors.join("; ")
        )))
    }
}
