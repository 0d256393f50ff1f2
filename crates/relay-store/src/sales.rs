use rusqlite::params;

use relay_core::domain::{LogicalId, MessageId, PaidSale, UserId};

use crate::convert::{parse_ts, ts};
use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn record_sale(&self, sale: &PaidSale) -> Result<()> {
        self.conn().execute(
            "INSERT INTO paid_media_sales (owner_id, message_id, buyer_id, stars, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sale.logical.sender.0,
                sale.logical.message_id.0,
                sale.buyer.0,
                sale.stars,
                ts(&sale.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn sales_for(&self, owner: UserId) -> Result<Vec<PaidSale>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner_id, message_id, buyer_id, stars, created_at
             FROM paid_media_sales WHERE owner_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner.0], |row| {
            let raw: String = row.get(4)?;
            Ok(PaidSale {
                logical: LogicalId::new(UserId(row.get(0)?), MessageId(row.get(1)?)),
                buyer: UserId(row.get(2)?),
                stars: row.get(3)?,
                created_at: parse_ts(4, &raw)?,
            })
        })?;

        let mut sales = Vec::new();
        for row in rows {
            sales.push(row?);
        }
        Ok(sales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sales_are_listed_per_owner() {
        let db = Database::open_in_memory().unwrap();
        let sale = |owner: i64, msg: i32, stars: u32| PaidSale {
            logical: LogicalId::new(UserId(owner), MessageId(msg)),
            buyer: UserId(9),
            stars,
            created_at: Utc::now(),
        };
        db.record_sale(&sale(1, 10, 25)).unwrap();
        db.record_sale(&sale(2, 11, 5)).unwrap();
        db.record_sale(&sale(1, 12, 50)).unwrap();

        let mine = db.sales_for(UserId(1)).unwrap();
        assert_eq!(
            mine.iter().map(|s| s.stars).collect::<Vec<_>>(),
            vec![25, 50]
        );
        assert_eq!(mine[0].buyer, UserId(9));
        assert!(db.sales_for(UserId(3)).unwrap().is_empty());
    }
}
