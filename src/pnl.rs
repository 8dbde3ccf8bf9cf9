#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PnlSign {
    Profit,
    Loss,
    Unchanged,
}

/// Profit or loss of a position against its purchase price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitLoss {
    /// No purchase price recorded or no current price; rendered blank.
    NotApplicable,
    Position {
        amount: f64,
        percentage: f64,
        sign: PnlSign,
    },
}

impl ProfitLoss {
    pub fn compute(purchase_price: f64, current_price: Option<f64>) -> Self {
        let Some(current) = current_price else {
            return ProfitLoss::NotApplicable;
        };
        if purchase_price == 0.0 {
            return ProfitLoss::NotApplicable;
        }

        let amount = current - purchase_price;
        // Sign follows the amount as displayed, to the cent.
        let cents = (amount * 100.0).round();
        if cents == 0.0 {
            return ProfitLoss::Position {
                amount: 0.0,
                percentage: 0.0,
                sign: PnlSign::Unchanged,
            };
        }

        let percentage = amount / purchase_price * 100.0;
        let sign = if cents > 0.0 { PnlSign::Profit } else { PnlSign::Loss };

        ProfitLoss::Position {
            amount,
            percentage,
            sign,
        }
    }
}
